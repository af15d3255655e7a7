#![cfg_attr(not(test), no_std)]

mod budget;
mod calibration;
pub mod error;
mod ranging;
pub mod register_map;
pub mod sequence;
pub mod timing;
mod tuning;
mod vcsel;

#[cfg(test)]
mod testing;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, Operation, SevenBitAddress};
use register_map::{Accuracy, RangeMode, RegisterMap, VcselPeriodType, PAGE_SELECT};

pub use calibration::SpadInfo;
pub use error::Error;
pub use sequence::{SequenceStepEnables, SequenceStepTimeouts};

const I2C_ADDR_DEFAULT: SevenBitAddress = 0x29;

const MODEL_ID: u8 = 0xEE;

const IO_TIMEOUT_MS_DEFAULT: u32 = 1000;

/// Register written first, value second. Sequences of pairs are applied
/// strictly in order since page-select writes change the meaning of the
/// registers that follow them.
pub type RegBytePair = (u8, u8);

pub struct Vl53l0x<I2C, D> {
    dev: I2C,
    delay: D,
    address: SevenBitAddress,
    /// Latched from register 0x91 during init, written back before every start.
    stop_variable: u8,
    /// Last budget successfully programmed into the device.
    measurement_timing_budget_us: u32,
    /// Bound for every polling loop, 0 waits forever.
    io_timeout_ms: u32,
}

impl<I2C, D> Vl53l0x<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Use driver with default I2C address.
    ///
    /// Pass `&mut bus` to keep ownership of the bus outside of the driver.
    pub fn new(dev: I2C, delay: D) -> Self {
        Self {
            dev,
            delay,
            address: I2C_ADDR_DEFAULT,
            stop_variable: 0,
            measurement_timing_budget_us: 0,
            io_timeout_ms: IO_TIMEOUT_MS_DEFAULT,
        }
    }

    /// Use driver with sensor already moved to another address.
    pub fn with_address(dev: I2C, delay: D, address: SevenBitAddress) -> Self {
        Self {
            address,
            ..Self::new(dev, delay)
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.dev, self.delay)
    }

    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: u32) {
        self.io_timeout_ms = timeout_ms;
    }

    pub fn timeout_ms(&self) -> u32 {
        self.io_timeout_ms
    }

    /// Budget cached by the last budget read or write, in microseconds.
    pub fn measurement_timing_budget(&self) -> u32 {
        self.measurement_timing_budget_us
    }

    pub async fn read_register(&mut self, register: impl Into<u8>) -> Result<u8, Error<I2C::Error>> {
        let mut buf = [0; 1];

        self.dev
            .write_read(self.address, &[register.into()], &mut buf)
            .await?;

        Ok(buf[0])
    }

    pub async fn read_register_word(
        &mut self,
        register: impl Into<u8>,
    ) -> Result<u16, Error<I2C::Error>> {
        let mut buf = [0; 2];

        self.read_multiple(register, &mut buf).await?;

        Ok(u16::from_be_bytes(buf))
    }

    pub async fn read_multiple(
        &mut self,
        register_begin: impl Into<u8>,
        buf: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        self.dev
            .write_read(self.address, &[register_begin.into()], buf)
            .await?;

        Ok(())
    }

    pub async fn write_register(
        &mut self,
        register: impl Into<u8>,
        value: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.dev
            .write(self.address, &[register.into(), value])
            .await?;

        Ok(())
    }

    pub async fn write_register_u16(
        &mut self,
        register: impl Into<u8>,
        value: u16,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_multiple(register, &value.to_be_bytes()).await
    }

    pub async fn write_register_u32(
        &mut self,
        register: impl Into<u8>,
        value: u32,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_multiple(register, &value.to_be_bytes()).await
    }

    /// Block write, the device auto-increments the register address.
    pub async fn write_multiple(
        &mut self,
        register_begin: impl Into<u8>,
        buf: &[u8],
    ) -> Result<(), Error<I2C::Error>> {
        let register = [register_begin.into()];

        self.dev
            .transaction(
                self.address,
                &mut [Operation::Write(&register), Operation::Write(buf)],
            )
            .await?;

        Ok(())
    }

    pub async fn write_reg_values(&mut self, pairs: &[RegBytePair]) -> Result<(), Error<I2C::Error>> {
        for &(register, value) in pairs {
            self.write_register(register, value).await?;
        }

        Ok(())
    }

    /// Read `register` until `ready` accepts its value. Fails with the last
    /// value read once `io_timeout_ms` has passed.
    pub(crate) async fn wait_for_register(
        &mut self,
        register: impl Into<u8>,
        ready: impl Fn(u8) -> bool,
    ) -> Result<u8, Error<I2C::Error>> {
        let register = register.into();
        let mut time_passed_ms = 0;

        loop {
            let value = self.read_register(register).await?;

            if ready(value) {
                return Ok(value);
            }

            if self.io_timeout_ms > 0 && time_passed_ms >= self.io_timeout_ms {
                return Err(Error::Timeout {
                    register,
                    last_value: value,
                });
            }

            self.delay.delay_ms(1).await;

            time_passed_ms += 1;
        }
    }

    pub async fn get_model_id(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_register(RegisterMap::IdentificationModelId).await
    }

    pub async fn get_product_minor_revision(&mut self) -> Result<u8, Error<I2C::Error>> {
        let revision_id = self
            .read_register(RegisterMap::IdentificationRevisionId)
            .await?;

        Ok((revision_id & 0xF0) >> 4)
    }

    /// Check that the sensor answers with VL53L0X model ID.
    pub async fn is_present(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.get_model_id().await? == MODEL_ID)
    }

    /// Software reset. Waits for the model ID register to drop to zero and to
    /// come back after release.
    pub async fn reset(&mut self) -> Result<(), Error<I2C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::trace!("Resetting sensor at {}", self.address);

        self.write_register(RegisterMap::SoftResetGo2SoftResetN, 0x00)
            .await?;

        self.wait_for_register(RegisterMap::IdentificationModelId, |model_id| {
            model_id == 0
        })
        .await?;

        self.write_register(RegisterMap::SoftResetGo2SoftResetN, 0x01)
            .await?;

        // Sensor drops off the bus while rebooting, bus errors only mean
        // it is not back yet.
        let mut time_passed_ms = 0;
        let mut last_value = 0;

        loop {
            if let Ok(model_id) = self.get_model_id().await {
                if model_id != 0 {
                    break;
                }

                last_value = model_id;
            }

            if self.io_timeout_ms > 0 && time_passed_ms >= self.io_timeout_ms {
                return Err(Error::Timeout {
                    register: RegisterMap::IdentificationModelId.into(),
                    last_value,
                });
            }

            self.delay.delay_ms(1).await;

            time_passed_ms += 1;
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("Sensor at {} rebooted", self.address);

        Ok(())
    }

    /// Program a new 7-bit address. Following transfers use the new address.
    pub async fn set_address(&mut self, new_address: SevenBitAddress) -> Result<(), Error<I2C::Error>> {
        if new_address > 0x7F {
            return Err(Error::InvalidAddress);
        }

        self.write_register(RegisterMap::I2cSlaveDeviceAddress, new_address)
            .await?;

        self.address = new_address;

        Ok(())
    }

    /// Set signal rate limit in MCPS, the minimum amplitude of reflected
    /// signal for a valid reading. Lower limit extends range but raises the
    /// chance of inaccurate readings. Stored as Q9.7 fixed point.
    pub async fn set_signal_rate_limit(&mut self, limit_mcps: f32) -> Result<(), Error<I2C::Error>> {
        if !(0.0..=511.99).contains(&limit_mcps) {
            return Err(Error::InvalidSignalRateLimit);
        }

        let limit = (limit_mcps * (1 << 7) as f32 + 0.5) as u16;

        self.write_register_u16(RegisterMap::FinalRangeConfigMinCountRateRtnLimit, limit)
            .await
    }

    pub async fn get_signal_rate_limit(&mut self) -> Result<f32, Error<I2C::Error>> {
        let limit = self
            .read_register_word(RegisterMap::FinalRangeConfigMinCountRateRtnLimit)
            .await?;

        Ok(f32::from(limit) / (1 << 7) as f32)
    }

    /// Apply range and accuracy presets. Sensor must be initialized.
    pub async fn config(
        &mut self,
        range_mode: RangeMode,
        accuracy: Accuracy,
    ) -> Result<(), Error<I2C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::debug!("Configuring {} for {} range, {} accuracy", self.address, range_mode, accuracy);

        self.set_signal_rate_limit(range_mode.signal_rate_limit_mcps())
            .await?;

        let (pre_range_pclks, final_range_pclks) = range_mode.vcsel_periods();

        self.set_vcsel_pulse_period(VcselPeriodType::PreRange, pre_range_pclks)
            .await?;
        self.set_vcsel_pulse_period(VcselPeriodType::FinalRange, final_range_pclks)
            .await?;

        self.set_measurement_timing_budget(accuracy.timing_budget_us())
            .await
    }

    /// Restore the latched stop variable, required before every measurement
    /// start. Register 0x91 is only reachable with the page-select dance.
    async fn write_stop_variable(&mut self) -> Result<(), Error<I2C::Error>> {
        let stop_variable = self.stop_variable;

        self.write_reg_values(&[
            (0x80, 0x01),
            (PAGE_SELECT, 0x01),
            (0x00, 0x00),
            (0x91, stop_variable),
            (0x00, 0x01),
            (PAGE_SELECT, 0x00),
            (0x80, 0x00),
        ])
        .await
    }
}
