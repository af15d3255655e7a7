use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::register_map::{RegisterMap, PAGE_SELECT, RESULT_RANGE_MILLIMETERS};
use crate::{Error, Vl53l0x};

const SYSRANGE_MODE_SINGLESHOT: u8 = 0x01;
const SYSRANGE_MODE_BACKTOBACK: u8 = 0x02;
const SYSRANGE_MODE_TIMED: u8 = 0x04;

impl<I2C, D> Vl53l0x<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Start continuous ranging. With `period_ms` of 0 the sensor measures
    /// back-to-back as fast as possible, otherwise it waits `period_ms`
    /// between measurements. A period shorter than the timing budget is
    /// stretched by the sensor.
    pub async fn start_continuous(&mut self, period_ms: u32) -> Result<(), Error<I2C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::debug!("Starting continuous ranging on {}, period {} ms", self.address, period_ms);

        self.write_stop_variable().await?;

        if period_ms != 0 {
            let osc_calibrate_val = self.read_register_word(RegisterMap::OscCalibrateVal).await?;

            // period register counts in oscillator ticks when calibration is known
            let period = if osc_calibrate_val != 0 {
                period_ms.wrapping_mul(u32::from(osc_calibrate_val))
            } else {
                period_ms
            };

            self.write_register_u32(RegisterMap::SystemIntermeasurementPeriod, period)
                .await?;

            self.write_register(RegisterMap::SysrangeStart, SYSRANGE_MODE_TIMED)
                .await
        } else {
            self.write_register(RegisterMap::SysrangeStart, SYSRANGE_MODE_BACKTOBACK)
                .await
        }
    }

    pub async fn stop_continuous(&mut self) -> Result<(), Error<I2C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::debug!("Stopping continuous ranging on {}", self.address);

        self.write_reg_values(&[
            (RegisterMap::SysrangeStart.into(), SYSRANGE_MODE_SINGLESHOT),
            (PAGE_SELECT, 0x01),
            (0x00, 0x00),
            (0x91, 0x00),
            (0x00, 0x01),
            (PAGE_SELECT, 0x00),
        ])
        .await
    }

    /// Range in millimeters once continuous ranging delivers a sample.
    /// 8190 or more means no target was seen.
    pub async fn read_range_continuous_millimeters(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.wait_for_register(RegisterMap::ResultInterruptStatus, |status| {
            status & 0x07 != 0
        })
        .await?;

        let range_mm = self.read_register_word(RESULT_RANGE_MILLIMETERS).await?;

        self.write_register(RegisterMap::SystemInterruptClear, 0x01)
            .await?;

        #[cfg(feature = "defmt")]
        defmt::trace!("Sensor at {} measured {} mm", self.address, range_mm);

        Ok(range_mm)
    }

    /// Trigger one measurement and wait for its result.
    pub async fn read_range_single_millimeters(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.write_stop_variable().await?;

        self.write_register(RegisterMap::SysrangeStart, SYSRANGE_MODE_SINGLESHOT)
            .await?;

        self.wait_for_register(RegisterMap::SysrangeStart, |start| {
            start & SYSRANGE_MODE_SINGLESHOT == 0
        })
        .await?;

        self.read_range_continuous_millimeters().await
    }
}
