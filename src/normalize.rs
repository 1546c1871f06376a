use ethers::types::U256;

use crate::constants::DISPLAY_FRACTION_DIGITS;

/// Converts a raw chain amount into a canonical decimal string.
///
/// The whole computation stays in integer arithmetic; 18-decimal amounts lose
/// sub-unit precision under `f64`, so no binary-float intermediate is ever
/// used. The fractional part is truncated to six digits and trailing zeros
/// are stripped.
pub fn normalize(raw: U256, decimals: u32) -> String {
    if raw.is_zero() {
        return "0".to_string();
    }
    if decimals == 0 {
        return raw.to_string();
    }

    let (whole, frac, width) = match U256::from(10).checked_pow(U256::from(decimals)) {
        Some(base) => (raw / base, raw % base, decimals as usize),
        None => {
            // 10^decimals exceeds 256 bits. Scale the raw amount down to
            // the displayed precision first; the quotient is the value in
            // millionths, truncated.
            let mut scaled = raw;
            let mut remaining = decimals - DISPLAY_FRACTION_DIGITS;
            while remaining > 0 {
                let step = remaining.min(77);
                scaled = scaled / U256::from(10).pow(U256::from(step));
                remaining -= step;
            }
            let base = U256::from(10).pow(U256::from(DISPLAY_FRACTION_DIGITS));
            (
                scaled / base,
                scaled % base,
                DISPLAY_FRACTION_DIGITS as usize,
            )
        }
    };

    if frac.is_zero() {
        return whole.to_string();
    }

    let mut frac_str = format!("{:0>width$}", frac.to_string(), width = width);
    frac_str.truncate(DISPLAY_FRACTION_DIGITS as usize);
    let trimmed = frac_str.trim_end_matches('0');
    if trimmed.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_unit_is_one_for_every_precision() {
        for decimals in 0..=30u32 {
            let raw = U256::from(10).pow(U256::from(decimals));
            assert_eq!(normalize(raw, decimals), "1", "decimals={}", decimals);
        }
    }

    #[test]
    fn usdc_six_decimals() {
        assert_eq!(normalize(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(normalize(U256::from(1_000_001u64), 6), "1.000001");
        assert_eq!(normalize(U256::from(250u64), 6), "0.00025");
    }

    #[test]
    fn zero_is_zero_regardless_of_decimals() {
        assert_eq!(normalize(U256::zero(), 0), "0");
        assert_eq!(normalize(U256::zero(), 6), "0");
        assert_eq!(normalize(U256::zero(), 18), "0");
    }

    #[test]
    fn eighteen_decimal_amounts_keep_subunit_precision() {
        // 1.234567890... ETH truncates to six fractional digits.
        let raw = U256::from_dec_str("1234567890000000000").unwrap();
        assert_eq!(normalize(raw, 18), "1.234567");

        // A single wei is below display precision, not an error.
        assert_eq!(normalize(U256::from(1u64), 18), "0");
    }

    #[test]
    fn trailing_zeros_are_stripped() {
        assert_eq!(normalize(U256::from(1_230_000u64), 6), "1.23");
        assert_eq!(normalize(U256::from(5_000_000u64), 6), "5");
    }

    #[test]
    fn zero_decimals_is_a_plain_integer() {
        assert_eq!(normalize(U256::from(42u64), 0), "42");
    }

    #[test]
    fn precisions_beyond_the_integer_width_still_display() {
        // U256::MAX / 10^78 is roughly 0.1157920892; the displayed value
        // keeps its six fractional digits instead of collapsing to zero.
        assert_eq!(normalize(U256::MAX, 78), "0.115792");

        // Far below display precision rounds down to zero.
        assert_eq!(normalize(U256::MAX, 100), "0");
        assert_eq!(normalize(U256::from(1u64), 78), "0");
    }
}
