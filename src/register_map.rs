#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RegisterMap {
    SysrangeStart = 0x00,
    SystemSequenceConfig = 0x01,
    SystemIntermeasurementPeriod = 0x04,
    SystemInterruptConfigGpio = 0x0A,
    SystemInterruptClear = 0x0B,
    ResultInterruptStatus = 0x13,
    ResultRangeStatus = 0x14,
    AlgoPhasecalConfigTimeout = 0x30,
    GlobalConfigVcselWidth = 0x32,
    FinalRangeConfigMinCountRateRtnLimit = 0x44,
    MsrcConfigTimeoutMacrop = 0x46,
    FinalRangeConfigValidPhaseLow = 0x47,
    FinalRangeConfigValidPhaseHigh = 0x48,
    DynamicSpadNumRequestedRefSpad = 0x4E,
    DynamicSpadRefEnStartOffset = 0x4F,
    PreRangeConfigVcselPeriod = 0x50,
    PreRangeConfigTimeoutMacropHi = 0x51,
    PreRangeConfigValidPhaseLow = 0x56,
    PreRangeConfigValidPhaseHigh = 0x57,
    MsrcConfigControl = 0x60,
    FinalRangeConfigVcselPeriod = 0x70,
    FinalRangeConfigTimeoutMacropHi = 0x71,
    GpioHvMuxActiveHigh = 0x84,
    VhvConfigPadSclSdaExtsupHv = 0x89,
    I2cSlaveDeviceAddress = 0x8A,
    GlobalConfigSpadEnablesRef0 = 0xB0,
    GlobalConfigRefEnStartSelect = 0xB6,
    SoftResetGo2SoftResetN = 0xBF,
    IdentificationModelId = 0xC0,
    IdentificationRevisionId = 0xC2,
    OscCalibrateVal = 0xF8,
}

impl From<RegisterMap> for u8 {
    fn from(register: RegisterMap) -> Self {
        register as u8
    }
}

/// Page-select register, pages 0x00, 0x01, 0x06 and 0x07 are used.
pub const PAGE_SELECT: u8 = 0xFF;

/// Phase calibration limit, lives on page 0x01 at the same address as
/// [`RegisterMap::AlgoPhasecalConfigTimeout`].
pub const ALGO_PHASECAL_LIM: u8 = 0x30;

/// Range in millimeters, offset 10 into the result block.
pub const RESULT_RANGE_MILLIMETERS: u8 = RegisterMap::ResultRangeStatus as u8 + 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VcselPeriodType {
    PreRange,
    FinalRange,
}

impl VcselPeriodType {
    pub(crate) fn period_register(&self) -> RegisterMap {
        match self {
            VcselPeriodType::PreRange => RegisterMap::PreRangeConfigVcselPeriod,
            VcselPeriodType::FinalRange => RegisterMap::FinalRangeConfigVcselPeriod,
        }
    }
}

/// Expected distance to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeMode {
    /// Signal rate limit 0.25 MCPS, VCSEL periods 14 and 10 PCLKs.
    Regular,
    /// Signal rate limit 0.10 MCPS, VCSEL periods 18 and 14 PCLKs.
    /// Use only when regular mode reports 8190 mm or more.
    Long,
}

impl RangeMode {
    pub fn signal_rate_limit_mcps(&self) -> f32 {
        match self {
            RangeMode::Regular => 0.25,
            RangeMode::Long => 0.1,
        }
    }

    /// Pre-range and final-range VCSEL periods in PCLKs.
    pub fn vcsel_periods(&self) -> (u8, u8) {
        match self {
            RangeMode::Regular => (14, 10),
            RangeMode::Long => (18, 14),
        }
    }
}

/// Accuracy versus measurement time trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Accuracy {
    HighSpeed,
    Regular,
    Good,
    High,
    Highest,
}

impl Accuracy {
    pub fn timing_budget_us(&self) -> u32 {
        match self {
            Accuracy::HighSpeed => 20_000,
            Accuracy::Regular => 33_000,
            Accuracy::Good => 66_000,
            Accuracy::High => 100_000,
            Accuracy::Highest => 200_000,
        }
    }
}
