use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::register_map::{RegisterMap, PAGE_SELECT};
use crate::sequence::SEQUENCE_CONFIG_DEFAULT;
use crate::tuning::TUNING_SETTINGS;
use crate::{Error, Vl53l0x};

const SPAD_MAP_SIZE: usize = 6;
const SPAD_COUNT: u8 = (SPAD_MAP_SIZE * 8) as u8;
/// First SPAD of the aperture type.
const FIRST_APERTURE_SPAD: u8 = 12;

/// Single-shot start bit of `SYSRANGE_START`.
const SYSRANGE_MODE_START_STOP: u8 = 0x01;
const VHV_CALIBRATION: u8 = 0x40;

/// Reference SPAD (single photon avalanche diode) count and type, read once
/// per initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpadInfo {
    pub count: u8,
    pub type_is_aperture: bool,
}

impl SpadInfo {
    pub fn from_register(value: u8) -> Self {
        Self {
            count: value & 0x7F,
            type_is_aperture: value & 0x80 != 0,
        }
    }

    pub fn first_spad_to_enable(&self) -> u8 {
        if self.type_is_aperture {
            FIRST_APERTURE_SPAD
        } else {
            0
        }
    }

    /// Keep the first `count` SPADs already enabled in `spad_map`, starting at
    /// the first SPAD of this type, and clear everything else.
    pub fn select_reference_spads(&self, spad_map: &mut [u8; SPAD_MAP_SIZE]) {
        let first_spad = self.first_spad_to_enable();
        let mut spads_enabled = 0;

        for spad in 0..SPAD_COUNT {
            let byte = usize::from(spad / 8);
            let mask = 1 << (spad % 8);

            if spad < first_spad || spads_enabled == self.count {
                spad_map[byte] &= !mask;
            } else if spad_map[byte] & mask != 0 {
                spads_enabled += 1;
            }
        }
    }
}

impl<I2C, D> Vl53l0x<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Bring up a freshly reset sensor: data init, reference SPAD setup,
    /// tuning settings, interrupt config and reference calibration. Reference
    /// SPAD management is not performed, the values ST programs into the
    /// module are used as they are.
    ///
    /// Any failure leaves the sensor half configured, recover with
    /// [`reset`](Self::reset) followed by another `init`.
    pub async fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        #[cfg(feature = "defmt")]
        defmt::trace!("Initializing sensor at {}", self.address);

        #[cfg(feature = "io_2v8")]
        {
            let pad_config = self
                .read_register(RegisterMap::VhvConfigPadSclSdaExtsupHv)
                .await?;

            self.write_register(RegisterMap::VhvConfigPadSclSdaExtsupHv, pad_config | 0x01)
                .await?;
        }

        // I2C standard mode
        self.write_register(0x88u8, 0x00).await?;

        self.write_reg_values(&[(0x80, 0x01), (PAGE_SELECT, 0x01), (0x00, 0x00)])
            .await?;
        self.stop_variable = self.read_register(0x91u8).await?;
        self.write_reg_values(&[(0x00, 0x01), (PAGE_SELECT, 0x00), (0x80, 0x00)])
            .await?;

        // disable SIGNAL_RATE_MSRC (bit 1) and SIGNAL_RATE_PRE_RANGE (bit 4)
        // limit checks
        let msrc_config = self.read_register(RegisterMap::MsrcConfigControl).await?;
        self.write_register(RegisterMap::MsrcConfigControl, msrc_config | 0x12)
            .await?;

        self.set_signal_rate_limit(0.25).await?;

        self.write_register(RegisterMap::SystemSequenceConfig, 0xFF)
            .await?;

        self.set_reference_spads().await?;

        self.write_reg_values(&TUNING_SETTINGS).await?;

        // interrupt on new sample ready, active low
        self.write_register(RegisterMap::SystemInterruptConfigGpio, 0x04)
            .await?;
        let gpio_mux = self.read_register(RegisterMap::GpioHvMuxActiveHigh).await?;
        self.write_register(RegisterMap::GpioHvMuxActiveHigh, gpio_mux & !0x10)
            .await?;
        self.write_register(RegisterMap::SystemInterruptClear, 0x01)
            .await?;

        self.measurement_timing_budget_us = self.get_measurement_timing_budget().await?;

        // MSRC and TCC off by default, budget must be recomputed afterwards
        self.write_register(RegisterMap::SystemSequenceConfig, SEQUENCE_CONFIG_DEFAULT)
            .await?;
        self.set_measurement_timing_budget(self.measurement_timing_budget_us)
            .await?;

        self.write_register(RegisterMap::SystemSequenceConfig, 0x01)
            .await?;
        self.perform_single_ref_calibration(VHV_CALIBRATION).await?;

        self.write_register(RegisterMap::SystemSequenceConfig, 0x02)
            .await?;
        self.perform_single_ref_calibration(0x00).await?;

        self.write_register(RegisterMap::SystemSequenceConfig, SEQUENCE_CONFIG_DEFAULT)
            .await?;

        #[cfg(feature = "defmt")]
        defmt::trace!("Sensor at {} initialized", self.address);

        Ok(())
    }

    pub async fn get_spad_info(&mut self) -> Result<SpadInfo, Error<I2C::Error>> {
        self.write_reg_values(&[(0x80, 0x01), (PAGE_SELECT, 0x01), (0x00, 0x00)])
            .await?;

        self.write_register(PAGE_SELECT, 0x06).await?;
        let value = self.read_register(0x83u8).await?;
        self.write_reg_values(&[(0x83, value | 0x04), (PAGE_SELECT, 0x07), (0x81, 0x01)])
            .await?;

        self.write_register(0x80u8, 0x01).await?;

        self.write_reg_values(&[(0x94, 0x6B), (0x83, 0x00)]).await?;
        self.wait_for_register(0x83u8, |value| value != 0x00).await?;
        self.write_register(0x83u8, 0x01).await?;

        let spad_info = SpadInfo::from_register(self.read_register(0x92u8).await?);

        self.write_reg_values(&[(0x81, 0x00), (PAGE_SELECT, 0x06)])
            .await?;
        let value = self.read_register(0x83u8).await?;
        self.write_reg_values(&[
            (0x83, value & !0x04),
            (PAGE_SELECT, 0x01),
            (0x00, 0x01),
            (PAGE_SELECT, 0x00),
            (0x80, 0x00),
        ])
        .await?;

        Ok(spad_info)
    }

    /// Enable exactly the reference SPADs reported by the module. The good
    /// SPAD map is read back from the enables registers where NVM put it.
    async fn set_reference_spads(&mut self) -> Result<(), Error<I2C::Error>> {
        let spad_info = self.get_spad_info().await?;

        #[cfg(feature = "defmt")]
        defmt::trace!("Reference SPADs: {}", spad_info);

        let mut spad_map = [0; SPAD_MAP_SIZE];
        self.read_multiple(RegisterMap::GlobalConfigSpadEnablesRef0, &mut spad_map)
            .await?;

        self.write_reg_values(&[
            (PAGE_SELECT, 0x01),
            (RegisterMap::DynamicSpadRefEnStartOffset.into(), 0x00),
            (RegisterMap::DynamicSpadNumRequestedRefSpad.into(), 0x2C),
            (PAGE_SELECT, 0x00),
            (RegisterMap::GlobalConfigRefEnStartSelect.into(), 0xB4),
        ])
        .await?;

        spad_info.select_reference_spads(&mut spad_map);

        self.write_multiple(RegisterMap::GlobalConfigSpadEnablesRef0, &spad_map)
            .await
    }

    pub(crate) async fn perform_single_ref_calibration(
        &mut self,
        vhv_init_byte: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.write_register(
            RegisterMap::SysrangeStart,
            SYSRANGE_MODE_START_STOP | vhv_init_byte,
        )
        .await?;

        self.wait_for_register(RegisterMap::ResultInterruptStatus, |status| {
            status & 0x07 != 0
        })
        .await?;

        self.write_register(RegisterMap::SystemInterruptClear, 0x01)
            .await?;
        self.write_register(RegisterMap::SysrangeStart, 0x00).await
    }

    /// Phase calibration pass with only its step enabled, needed after every
    /// VCSEL period change.
    pub(crate) async fn perform_phase_calibration(&mut self) -> Result<(), Error<I2C::Error>> {
        let sequence_config = self
            .read_register(RegisterMap::SystemSequenceConfig)
            .await?;

        self.write_register(RegisterMap::SystemSequenceConfig, 0x02)
            .await?;
        self.perform_single_ref_calibration(0x00).await?;

        self.write_register(RegisterMap::SystemSequenceConfig, sequence_config)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_map::{Accuracy, RangeMode, VcselPeriodType};
    use crate::testing::{FakeDelay, FakeSensor};
    use embassy_futures::block_on;
    use quickcheck::quickcheck;

    fn initialized_sensor() -> Vl53l0x<FakeSensor, FakeDelay> {
        let mut sensor = Vl53l0x::new(FakeSensor::booted(), FakeDelay::new());

        block_on(sensor.init()).unwrap();

        sensor
    }

    #[test]
    fn spad_info_decode() {
        assert_eq!(
            SpadInfo::from_register(0x85),
            SpadInfo {
                count: 5,
                type_is_aperture: true
            }
        );
        assert_eq!(
            SpadInfo::from_register(0x7F),
            SpadInfo {
                count: 127,
                type_is_aperture: false
            }
        );
    }

    #[test]
    fn reference_spads_start_at_aperture_offset() {
        let mut spad_map = [0xFF; SPAD_MAP_SIZE];

        SpadInfo::from_register(0x85).select_reference_spads(&mut spad_map);

        assert_eq!(spad_map, [0x00, 0xF0, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn reference_spads_skip_disabled_ones() {
        let mut spad_map = [0b1010_1010, 0xFF, 0x00, 0x00, 0x00, 0x00];

        SpadInfo::from_register(0x03).select_reference_spads(&mut spad_map);

        assert_eq!(spad_map, [0b0010_1010, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    quickcheck! {
    fn reference_spad_count_is_exact(value: u8) -> bool {
        let spad_info = SpadInfo::from_register(value);
        let first_spad = spad_info.first_spad_to_enable();
        let mut spad_map = [0xFF; SPAD_MAP_SIZE];

        spad_info.select_reference_spads(&mut spad_map);

        let enabled: u32 = spad_map.iter().map(|byte| byte.count_ones()).sum();
        let below_first = (0..first_spad)
            .any(|spad| spad_map[usize::from(spad / 8)] & (1 << (spad % 8)) != 0);

        enabled == u32::from(spad_info.count.min(SPAD_COUNT - first_spad)) && !below_first
    }

    fn reference_spads_are_subset_of_good_map(value: u8, good: (u8, u8, u8, u8, u8, u8)) -> bool {
        let good = [good.0, good.1, good.2, good.3, good.4, good.5];
        let mut spad_map = good;

        SpadInfo::from_register(value).select_reference_spads(&mut spad_map);

        let enabled: u32 = spad_map.iter().map(|byte| byte.count_ones()).sum();

        spad_map.iter().zip(good.iter()).all(|(selected, good)| selected & !good == 0)
            && enabled <= u32::from(value & 0x7F)
    }
    }

    #[test]
    fn init_latches_stop_variable_and_programs_spads() {
        let sensor = initialized_sensor();

        assert_eq!(sensor.stop_variable, 0x3C);

        let (dev, _) = sensor.release();
        let spad_map: Vec<u8> = (0xB0..=0xB5).map(|register| dev.register(0, register)).collect();
        assert_eq!(spad_map, [0x00, 0xF0, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(dev.register(1, 0x4F), 0x00);
        assert_eq!(dev.register(1, 0x4E), 0x2C);
        assert_eq!(dev.register(0, 0xB6), 0xB4);
    }

    #[test]
    fn init_runs_sequence_in_order() {
        let sensor = initialized_sensor();

        assert_eq!(sensor.measurement_timing_budget(), 33971);

        let (dev, _) = sensor.release();
        #[cfg(feature = "io_2v8")]
        assert_eq!(dev.register(0, 0x89), 0x01);
        assert_eq!(dev.register(0, 0x88), 0x00);
        assert_eq!(dev.register(0, 0x0A), 0x04);
        // all steps, tuning default, MSRC and TCC off, VHV, phase, restore
        assert_eq!(dev.writes_to(0x01), [0xFF, 0xF8, 0xE8, 0x01, 0x02, 0xE8]);
        assert_eq!(dev.register(0, 0x01), 0xE8);
        // VHV calibration carries its flag, phase calibration does not
        assert!(dev.writes_to(0x00).ends_with(&[0x41, 0x00, 0x01, 0x00]));
        assert!(dev.writes().ends_with(&[(0x0B, 0x01), (0x00, 0x00), (0x01, 0xE8)]));
    }

    #[test]
    fn init_writes_tuning_settings_verbatim() {
        let sensor = initialized_sensor();
        let (dev, _) = sensor.release();

        assert!(dev
            .writes()
            .windows(TUNING_SETTINGS.len())
            .any(|window| window == TUNING_SETTINGS));
    }

    #[test]
    fn init_fails_when_calibration_never_completes() {
        let mut dev = FakeSensor::booted();
        dev.unpin(0x13);

        let mut sensor = Vl53l0x::new(dev, FakeDelay::new());
        sensor.set_timeout_ms(3);

        assert!(matches!(
            block_on(sensor.init()),
            Err(Error::Timeout {
                register: 0x13,
                last_value: 0
            })
        ));
    }

    #[test]
    fn init_fails_when_spad_info_never_ready() {
        let mut dev = FakeSensor::booted();
        dev.unpin(0x83);

        let mut sensor = Vl53l0x::new(dev, FakeDelay::new());
        sensor.set_timeout_ms(3);

        assert!(matches!(
            block_on(sensor.init()),
            Err(Error::Timeout { register: 0x83, .. })
        ));
    }

    #[test]
    fn config_regular_range_regular_accuracy() {
        let mut sensor = initialized_sensor();

        block_on(sensor.config(RangeMode::Regular, Accuracy::Regular)).unwrap();

        assert_eq!(sensor.measurement_timing_budget(), 33_000);

        let (dev, _) = sensor.release();
        assert_eq!(dev.register(0, 0x50), 0x06);
        assert_eq!(dev.register(0, 0x70), 0x04);
        assert_eq!(dev.register_word(0, 0x44), 0x0020);
    }

    #[test]
    fn config_long_range_high_accuracy() {
        let mut sensor = initialized_sensor();

        block_on(async {
            sensor
                .config(RangeMode::Long, Accuracy::High)
                .await
                .unwrap();

            assert_eq!(
                sensor
                    .get_vcsel_pulse_period(VcselPeriodType::PreRange)
                    .await
                    .unwrap(),
                18
            );
            assert_eq!(
                sensor
                    .get_vcsel_pulse_period(VcselPeriodType::FinalRange)
                    .await
                    .unwrap(),
                14
            );
        });

        assert_eq!(sensor.measurement_timing_budget(), 100_000);

        let (dev, _) = sensor.release();
        assert_eq!(dev.register_word(0, 0x44), 0x000D);
        assert_eq!(dev.register(0, 0x01), 0xE8);
    }
}
