//! Decimal <-> fixed-point conversion for guest inputs and outputs.

use crate::error::{Error, Result};
pub use zkcalc_guest::SCALE;

/// Largest magnitude accepted as a decimal input. Keeps the scaled value and
/// the sum of two scaled values exactly representable in both `i64` and `f64`.
pub const MAX_DECIMAL: f64 = 100_000_000_000.0;

/// Decimals are rounded to the nearest 1/SCALE.
pub fn to_fixed_point(decimal: f64) -> Result<i64> {
    if !decimal.is_finite() {
        return Err(Error::ArgumentOutOfRange(format!(
            "{decimal} is not a finite number"
        )));
    }
    if decimal.abs() > MAX_DECIMAL {
        return Err(Error::ArgumentOutOfRange(format!(
            "{decimal} exceeds the supported magnitude {MAX_DECIMAL}"
        )));
    }
    Ok((decimal * SCALE as f64).round() as i64)
}

pub fn from_fixed_point(fixed: i64) -> f64 {
    fixed as f64 / SCALE as f64
}

pub fn to_fixed_point_vec(decimals: &[f64]) -> Result<Vec<i64>> {
    decimals.iter().copied().map(to_fixed_point).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip() {
        assert_eq!(to_fixed_point(3.5).unwrap(), 35_000);
        assert_eq!(to_fixed_point(2.1).unwrap(), 21_000);
        assert_eq!(to_fixed_point(-0.00006).unwrap(), -1);
        assert_eq!(to_fixed_point(0.00004).unwrap(), 0);
        assert_eq!(from_fixed_point(56_000), 5.6);
    }

    #[test]
    fn test_out_of_range() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e12, -1e12] {
            let err = to_fixed_point(bad).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::ArgumentOutOfRange);
        }
        assert!(to_fixed_point(MAX_DECIMAL).is_ok());
    }

    proptest! {
        #[test]
        fn test_sum_within_one_unit(
            a in 0i64..1_000_000_000_000,
            b in 0i64..1_000_000_000_000
        ) {
            // a and b are exact 4-digit decimals
            let da = a as f64 / SCALE as f64;
            let db = b as f64 / SCALE as f64;
            let sum = from_fixed_point(to_fixed_point(da).unwrap() + to_fixed_point(db).unwrap());
            prop_assert!((sum - (da + db)).abs() <= 1.0 / SCALE as f64);
        }
    }
}
