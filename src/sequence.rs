use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::register_map::{RegisterMap, VcselPeriodType};
use crate::timing::{decode_timeout, decode_vcsel_period, mclks_to_us};
use crate::{Error, Vl53l0x};

/// Bit positions in `SYSTEM_SEQUENCE_CONFIG`. Fixed hardware layout, TCC sits
/// above DSS and MSRC, bit 5 is unused.
const MSRC_BIT: u8 = 2;
const DSS_BIT: u8 = 3;
const TCC_BIT: u8 = 4;
const PRE_RANGE_BIT: u8 = 6;
const FINAL_RANGE_BIT: u8 = 7;

/// Sequence config used for normal ranging: DSS, pre-range and final-range
/// enabled, MSRC and TCC disabled.
pub(crate) const SEQUENCE_CONFIG_DEFAULT: u8 = 0xE8;

/// Steps of the ranging sequence currently enabled. TCC: target centre
/// check, MSRC: minimum signal rate check, DSS: dynamic SPAD selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceStepEnables {
    pub tcc: bool,
    pub msrc: bool,
    pub dss: bool,
    pub pre_range: bool,
    pub final_range: bool,
}

impl SequenceStepEnables {
    pub fn from_register(sequence_config: u8) -> Self {
        let bit = |position: u8| sequence_config & (1 << position) != 0;

        Self {
            tcc: bit(TCC_BIT),
            msrc: bit(MSRC_BIT),
            dss: bit(DSS_BIT),
            pre_range: bit(PRE_RANGE_BIT),
            final_range: bit(FINAL_RANGE_BIT),
        }
    }

    pub fn to_register(&self) -> u8 {
        let bit = |enabled: bool, position: u8| u8::from(enabled) << position;

        bit(self.tcc, TCC_BIT)
            | bit(self.msrc, MSRC_BIT)
            | bit(self.dss, DSS_BIT)
            | bit(self.pre_range, PRE_RANGE_BIT)
            | bit(self.final_range, FINAL_RANGE_BIT)
    }
}

/// Step timeouts as read from the device together with the VCSEL periods
/// needed to convert them. Only valid until the next period or enable change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceStepTimeouts {
    pub pre_range_vcsel_period_pclks: u8,
    pub final_range_vcsel_period_pclks: u8,

    /// MSRC, DSS and TCC share one timeout.
    pub msrc_dss_tcc_mclks: u32,
    pub pre_range_mclks: u32,
    /// Final range alone, pre-range share already removed.
    pub final_range_mclks: u32,

    pub msrc_dss_tcc_us: u32,
    pub pre_range_us: u32,
    pub final_range_us: u32,
}

impl<I2C, D> Vl53l0x<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub async fn get_sequence_step_enables(
        &mut self,
    ) -> Result<SequenceStepEnables, Error<I2C::Error>> {
        let sequence_config = self
            .read_register(RegisterMap::SystemSequenceConfig)
            .await?;

        Ok(SequenceStepEnables::from_register(sequence_config))
    }

    pub async fn get_vcsel_pulse_period(
        &mut self,
        period_type: VcselPeriodType,
    ) -> Result<u8, Error<I2C::Error>> {
        let period = self.read_register(period_type.period_register()).await?;

        Ok(decode_vcsel_period(period))
    }

    pub async fn get_sequence_step_timeouts(
        &mut self,
        enables: &SequenceStepEnables,
    ) -> Result<SequenceStepTimeouts, Error<I2C::Error>> {
        let pre_range_vcsel_period_pclks =
            self.get_vcsel_pulse_period(VcselPeriodType::PreRange).await?;

        let msrc_dss_tcc_mclks = u32::from(
            self.read_register(RegisterMap::MsrcConfigTimeoutMacrop)
                .await?,
        ) + 1;

        let pre_range_mclks = decode_timeout(
            self.read_register_word(RegisterMap::PreRangeConfigTimeoutMacropHi)
                .await?,
        );

        let final_range_vcsel_period_pclks = self
            .get_vcsel_pulse_period(VcselPeriodType::FinalRange)
            .await?;

        let mut final_range_mclks = decode_timeout(
            self.read_register_word(RegisterMap::FinalRangeConfigTimeoutMacropHi)
                .await?,
        );

        // pre-range and final-range share one macro clock timeline
        if enables.pre_range {
            final_range_mclks = final_range_mclks.saturating_sub(pre_range_mclks);
        }

        Ok(SequenceStepTimeouts {
            pre_range_vcsel_period_pclks,
            final_range_vcsel_period_pclks,
            msrc_dss_tcc_mclks,
            pre_range_mclks,
            final_range_mclks,
            msrc_dss_tcc_us: mclks_to_us(msrc_dss_tcc_mclks, pre_range_vcsel_period_pclks),
            pre_range_us: mclks_to_us(pre_range_mclks, pre_range_vcsel_period_pclks),
            final_range_us: mclks_to_us(final_range_mclks, final_range_vcsel_period_pclks),
        })
    }
}
