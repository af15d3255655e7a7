//! Conversions between microseconds, macro clocks (MCLKs) and the packed
//! register encodings used for sequence step timeouts and VCSEL periods.

use crate::register_map::VcselPeriodType;

const PLL_PERIOD_PS: u32 = 1655;
const MACRO_PERIOD_VCLKS: u32 = 2304;

/// Macro period in nanoseconds for the given VCSEL period in PCLKs.
pub fn macro_period_ns(vcsel_period_pclks: u8) -> u32 {
    (u32::from(vcsel_period_pclks) * MACRO_PERIOD_VCLKS * PLL_PERIOD_PS + 500) / 1000
}

pub fn mclks_to_us(timeout_mclks: u32, vcsel_period_pclks: u8) -> u32 {
    let macro_period_ns = u64::from(macro_period_ns(vcsel_period_pclks));

    ((u64::from(timeout_mclks) * macro_period_ns + macro_period_ns / 2) / 1000) as u32
}

pub fn us_to_mclks(timeout_us: u32, vcsel_period_pclks: u8) -> u32 {
    let macro_period_ns = u64::from(macro_period_ns(vcsel_period_pclks));

    ((u64::from(timeout_us) * 1000 + macro_period_ns / 2) / macro_period_ns) as u32
}

/// Timeout register format is "(LSByte * 2^MSByte) + 1".
pub fn decode_timeout(register_value: u16) -> u32 {
    u32::from(register_value & 0x00FF)
        .checked_shl(u32::from(register_value >> 8))
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

/// Zero stays zero, it marks the step timeout as disabled.
pub fn encode_timeout(timeout_mclks: u32) -> u16 {
    if timeout_mclks == 0 {
        return 0;
    }

    let mut ls_byte = timeout_mclks - 1;
    let mut ms_byte: u16 = 0;

    while ls_byte & 0xFFFF_FF00 > 0 {
        ls_byte >>= 1;
        ms_byte += 1;
    }

    (ms_byte << 8) | (ls_byte & 0xFF) as u16
}

pub fn decode_vcsel_period(register_value: u8) -> u8 {
    register_value.wrapping_add(1) << 1
}

pub fn encode_vcsel_period(period_pclks: u8) -> u8 {
    (period_pclks >> 1) - 1
}

pub fn is_valid_vcsel_period(period_type: VcselPeriodType, period_pclks: u8) -> bool {
    match period_type {
        VcselPeriodType::PreRange => matches!(period_pclks, 12 | 14 | 16 | 18),
        VcselPeriodType::FinalRange => matches!(period_pclks, 8 | 10 | 12 | 14),
    }
}
