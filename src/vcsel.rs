use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::register_map::{RegisterMap, VcselPeriodType, ALGO_PHASECAL_LIM, PAGE_SELECT};
use crate::timing::{encode_timeout, encode_vcsel_period, is_valid_vcsel_period, us_to_mclks};
use crate::{Error, RegBytePair, Vl53l0x};

/// Pre-range valid phase high limit per period.
fn pre_range_phase_high(period_pclks: u8) -> Option<u8> {
    match period_pclks {
        12 => Some(0x18),
        14 => Some(0x30),
        16 => Some(0x40),
        18 => Some(0x50),
        _ => None,
    }
}

/// Final-range phase settings per period: valid phase high, VCSEL width,
/// phase calibration timeout and phase calibration limit.
fn final_range_phase_settings(period_pclks: u8) -> Option<[RegBytePair; 7]> {
    let (phase_high, vcsel_width, phasecal_timeout, phasecal_lim) = match period_pclks {
        8 => (0x10, 0x02, 0x0C, 0x30),
        10 => (0x28, 0x03, 0x09, 0x20),
        12 => (0x38, 0x03, 0x08, 0x20),
        14 => (0x48, 0x03, 0x07, 0x20),
        _ => return None,
    };

    Some([
        (RegisterMap::FinalRangeConfigValidPhaseHigh.into(), phase_high),
        (RegisterMap::FinalRangeConfigValidPhaseLow.into(), 0x08),
        (RegisterMap::GlobalConfigVcselWidth.into(), vcsel_width),
        (RegisterMap::AlgoPhasecalConfigTimeout.into(), phasecal_timeout),
        (PAGE_SELECT, 0x01),
        (ALGO_PHASECAL_LIM, phasecal_lim),
        (PAGE_SELECT, 0x00),
    ])
}

impl<I2C, D> Vl53l0x<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Set VCSEL pulse period in PCLKs, even values only: pre-range 12 to 18
    /// (default 14), final range 8 to 14 (default 10). Longer periods extend
    /// range. Dependent timeouts are recomputed, the timing budget re-applied
    /// and phase calibration repeated.
    pub async fn set_vcsel_pulse_period(
        &mut self,
        period_type: VcselPeriodType,
        period_pclks: u8,
    ) -> Result<(), Error<I2C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Setting {} VCSEL period of {} to {}",
            period_type,
            self.address,
            period_pclks
        );

        if !is_valid_vcsel_period(period_type, period_pclks) {
            return Err(Error::InvalidPeriod);
        }

        let vcsel_period = encode_vcsel_period(period_pclks);

        // timeouts must be read with the period still in effect
        let enables = self.get_sequence_step_enables().await?;
        let timeouts = self.get_sequence_step_timeouts(&enables).await?;

        match period_type {
            VcselPeriodType::PreRange => {
                let phase_high =
                    pre_range_phase_high(period_pclks).ok_or(Error::InvalidPeriod)?;

                self.write_reg_values(&[
                    (RegisterMap::PreRangeConfigValidPhaseHigh.into(), phase_high),
                    (RegisterMap::PreRangeConfigValidPhaseLow.into(), 0x08),
                    (RegisterMap::PreRangeConfigVcselPeriod.into(), vcsel_period),
                ])
                .await?;

                let pre_range_timeout_mclks = us_to_mclks(timeouts.pre_range_us, period_pclks);

                self.write_register_u16(
                    RegisterMap::PreRangeConfigTimeoutMacropHi,
                    encode_timeout(pre_range_timeout_mclks),
                )
                .await?;

                // MSRC timeout register holds MCLKs - 1 and depends on the
                // pre-range period too
                let msrc_timeout_mclks = us_to_mclks(timeouts.msrc_dss_tcc_us, period_pclks);
                let msrc_timeout = if msrc_timeout_mclks > 256 {
                    255
                } else {
                    msrc_timeout_mclks.saturating_sub(1) as u8
                };

                self.write_register(RegisterMap::MsrcConfigTimeoutMacrop, msrc_timeout)
                    .await?;
            }
            VcselPeriodType::FinalRange => {
                let settings =
                    final_range_phase_settings(period_pclks).ok_or(Error::InvalidPeriod)?;

                self.write_reg_values(&settings).await?;

                self.write_register(RegisterMap::FinalRangeConfigVcselPeriod, vcsel_period)
                    .await?;

                let mut final_range_timeout_mclks =
                    us_to_mclks(timeouts.final_range_us, period_pclks);

                if enables.pre_range {
                    final_range_timeout_mclks += timeouts.pre_range_mclks;
                }

                self.write_register_u16(
                    RegisterMap::FinalRangeConfigTimeoutMacropHi,
                    encode_timeout(final_range_timeout_mclks),
                )
                .await?;
            }
        }

        self.set_measurement_timing_budget(self.measurement_timing_budget_us)
            .await?;

        self.perform_phase_calibration().await
    }
}
