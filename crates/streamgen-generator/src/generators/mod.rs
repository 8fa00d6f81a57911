//! Field value generators.
//!
//! Each `GeneratorConfig` kind maps to one function here. All randomness
//! comes from the caller's RNG so a seeded RNG yields reproducible rows;
//! `timestamp_now` is the only kind that reads the clock.

pub mod numeric;
pub mod pattern;
pub mod timestamp;
pub mod uuid;

use rand::Rng;
use streamgen_core::{yaml_to_value, GeneratorConfig, Value};

/// Generate a value for the row at `index`.
pub fn generate_value<R: Rng + ?Sized>(config: &GeneratorConfig, rng: &mut R, index: u64) -> Value {
    match config {
        GeneratorConfig::UuidV4 => uuid::generate_uuid_v4(rng),

        GeneratorConfig::Sequential { start } => {
            Value::Int64(start.wrapping_add_unsigned(index))
        }

        GeneratorConfig::Pattern { pattern } => pattern::generate_pattern(pattern, rng, index),

        GeneratorConfig::IntRange { min, max } => numeric::generate_int_range(rng, *min, *max),

        GeneratorConfig::FloatRange { min, max } => numeric::generate_float_range(rng, *min, *max),

        GeneratorConfig::DecimalRange { min, max, scale } => {
            numeric::generate_decimal_range(rng, *min, *max, *scale)
        }

        GeneratorConfig::TimestampRange { start, end } => {
            timestamp::generate_timestamp_range(rng, start, end)
        }

        GeneratorConfig::TimestampNow => timestamp::generate_timestamp_now(),

        GeneratorConfig::WeightedBool { true_weight } => {
            // NaN compares false against both clamp bounds and would reach
            // random_bool unchanged.
            let p = if true_weight.is_nan() {
                0.0
            } else {
                true_weight.clamp(0.0, 1.0)
            };
            Value::Bool(rng.random_bool(p))
        }

        GeneratorConfig::OneOf { values } => {
            if values.is_empty() {
                Value::Null
            } else {
                let idx = rng.random_range(0..values.len());
                yaml_to_value(&values[idx])
            }
        }

        GeneratorConfig::Static { value } => yaml_to_value(value),

        GeneratorConfig::Null => Value::Null,
    }
}
