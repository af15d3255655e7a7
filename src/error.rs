#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<T> {
    I2CError(T),
    /// Polled register did not reach expected state in time.
    Timeout {
        register: u8,
        last_value: u8,
    },
    /// VCSEL period not supported for the requested sequence step.
    InvalidPeriod,
    /// Timing budget below 20 ms.
    BudgetTooSmall,
    /// Enabled sequence steps do not fit in requested timing budget.
    BudgetExceeded,
    InvalidSignalRateLimit,
    InvalidAddress,
}

impl<T> From<T> for Error<T> {
    fn from(value: T) -> Self {
        Self::I2CError(value)
    }
}
