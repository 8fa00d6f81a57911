//! Numeric value generators.

use rand::Rng;
use streamgen_core::Value;

/// Generate a random integer in the given range (inclusive).
///
/// A reversed range yields `min`.
pub fn generate_int_range<R: Rng + ?Sized>(rng: &mut R, min: i64, max: i64) -> Value {
    if min >= max {
        return Value::Int64(min);
    }
    Value::Int64(rng.random_range(min..=max))
}

/// Generate a random float in the given range (inclusive).
///
/// A reversed range or a non-finite bound yields `min`.
pub fn generate_float_range<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> Value {
    Value::Float64(sample_f64(rng, min, max))
}

/// Generate a random decimal in the given range, formatted with `scale`
/// digits after the point.
pub fn generate_decimal_range<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64, scale: u8) -> Value {
    let value = sample_f64(rng, min, max);
    Value::Decimal {
        value: format!("{value:.prec$}", prec = usize::from(scale)),
        scale,
    }
}

fn sample_f64<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if !min.is_finite() || !max.is_finite() || min >= max {
        return min;
    }
    if (max - min).is_finite() {
        rng.random_range(min..=max)
    } else {
        // The span overflows f64; interpolate so no intermediate does.
        let t: f64 = rng.random();
        min * (1.0 - t) + max * t
    }
}
