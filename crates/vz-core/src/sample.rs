//! Sample types and decibel conversions

/// Type alias for incoming audio samples. Streams deliver 32-bit floats,
/// nominally in [-1, 1] but unbounded.
pub type Sample = f32;

/// Type alias for transform scratch arithmetic. Transforms and resonators
/// run in double precision regardless of the input sample type.
pub type FftFloat = f64;

/// Convert a decibel value to an amplitude fraction (20 dB per decade).
#[inline]
pub fn db_to_fraction(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert an amplitude fraction to decibels. Non-positive input maps to
/// negative infinity.
#[inline]
pub fn fraction_to_db(fraction: f64) -> f64 {
    if fraction <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * fraction.log10()
    }
}

/// Next power of two not less than `n`, with a floor of 1.
#[inline]
pub fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_trip() {
        for db in [-120.0, -60.0, -6.0, 0.0, 6.0] {
            let frac = db_to_fraction(db);
            assert!((fraction_to_db(frac) - db).abs() < 1e-9);
        }
    }

    #[test]
    fn test_db_reference_points() {
        assert!((db_to_fraction(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_fraction(-20.0) - 0.1).abs() < 1e-12);
        assert_eq!(fraction_to_db(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(15), 16);
        assert_eq!(next_pow2(16), 16);
        assert_eq!(next_pow2(17), 32);
    }
}
