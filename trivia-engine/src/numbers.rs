//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Convert a count to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Convert i64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn i64_to_f64(value: i64) -> f64 {
    cast::<i64, f64>(value).unwrap_or(0.0)
}

/// Floor a non-negative f64 into an index, returning 0 for non-finite or negative input.
#[must_use]
pub fn floor_f64_to_usize(value: f64) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    cast::<f64, usize>(value.floor()).unwrap_or(usize::MAX)
}

/// Round a f64 and clamp it to the u32 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_u32(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    let max = f64::from(u32::MAX);
    let clamped = value.clamp(0.0, max).round();
    cast::<f64, u32>(clamped).unwrap_or(0)
}

/// Round a value to `digits` significant digits, keeping zero and non-finite input as-is.
#[must_use]
pub fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor();
    let power = f64::from(digits - 1) - magnitude;
    let scale = 10f64.powf(power);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_handles_non_finite() {
        assert_eq!(floor_f64_to_usize(f64::NAN), 0);
        assert_eq!(floor_f64_to_usize(-3.0), 0);
        assert_eq!(floor_f64_to_usize(4.9), 4);
    }

    #[test]
    fn rounders_cover_ranges() {
        assert_eq!(round_f64_to_u32(1.6), 2);
        assert_eq!(round_f64_to_u32(f64::NAN), 0);
        assert_eq!(round_f64_to_u32(-5.0), 0);
        assert_eq!(round_f64_to_u32(f64::from(u32::MAX) * 2.0), u32::MAX);
    }

    #[test]
    fn significant_rounding_keeps_magnitude() {
        assert!((round_significant(1_234_567.0, 2) - 1_200_000.0).abs() < 1e-6);
        assert!((round_significant(0.004_56, 2) - 0.004_6).abs() < 1e-12);
        assert!(round_significant(0.0, 2).abs() < f64::EPSILON);
    }
}
