//! Number formatting shared by the PTO writer.
//!
//! Hugin writes reals with C's `%.15g`: fifteen significant digits,
//! trailing zeros removed, scientific notation only for very small or
//! very large magnitudes. [`real`] reproduces that so files written here
//! diff cleanly against files written by Hugin itself.

/// Significant digits kept for every real written to a PTO file.
pub const SIGNIFICANT_DIGITS: usize = 15;

/// Format `value` the way `printf("%.15g", value)` does.
///
/// ```
/// use pano_pto::format::real;
///
/// assert_eq!(real(360.0), "360");
/// assert_eq!(real(0.5), "0.5");
/// assert_eq!(real(1e20), "1e+20");
/// ```
#[must_use]
pub fn real(value: f64) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    // Round to the target precision first; the exponent of the rounded
    // value decides between fixed and scientific notation.
    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    #[allow(clippy::cast_possible_wrap)]
    let limit = SIGNIFICANT_DIGITS as i32;
    if exponent < -4 || exponent >= limit {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        #[allow(clippy::cast_sign_loss)]
        let decimals = (limit - 1 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_owned()
    }
}

/// Strip trailing zeros of a fractional part, and the dot if nothing is left.
fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_have_no_fraction() {
        assert_eq!(real(0.0), "0");
        assert_eq!(real(-0.0), "0");
        assert_eq!(real(1.0), "1");
        assert_eq!(real(360.0), "360");
        assert_eq!(real(-42.0), "-42");
    }

    #[test]
    fn fractions_are_trimmed() {
        assert_eq!(real(0.5), "0.5");
        assert_eq!(real(-2.25), "-2.25");
        assert_eq!(real(0.1), "0.1");
        assert_eq!(real(50.000_000_000_1), "50.0000000001");
    }

    #[test]
    fn fifteen_significant_digits() {
        assert_eq!(real(1.0 / 3.0), "0.333333333333333");
        assert_eq!(real(2.0 / 3.0), "0.666666666666667");
        assert_eq!(real(2.0 / 255.0), "0.00784313725490196");
    }

    #[test]
    fn small_magnitudes_use_scientific_notation() {
        assert_eq!(real(0.0001), "0.0001");
        assert_eq!(real(0.000_015), "1.5e-05");
        assert_eq!(real(-1e-10), "-1e-10");
    }

    #[test]
    fn large_magnitudes_use_scientific_notation() {
        assert_eq!(real(100_000_000_000_000.0), "100000000000000");
        assert_eq!(real(1e15), "1e+15");
        assert_eq!(real(1e20), "1e+20");
        assert_eq!(real(123_456_789_012_345_678.0), "1.23456789012346e+17");
    }

    #[test]
    fn rounding_can_bump_the_exponent() {
        assert_eq!(real(999_999_999_999_999.9), "1e+15");
    }

    #[test]
    fn output_parses_back() {
        for value in [0.25, -13.5, 1e-7, 4.5e16, 12_345.678_9] {
            assert_eq!(real(value).parse::<f64>().unwrap(), value);
        }
    }
}
