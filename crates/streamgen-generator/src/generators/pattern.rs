//! Pattern-based string generator.
//!
//! Supports placeholders:
//! - `{index}` - row index
//! - `{uuid}` - UUID drawn from the row RNG
//! - `{rand:N}` - random N-digit number

use super::uuid::random_uuid;
use rand::Rng;
use streamgen_core::Value;

/// Generate a string based on a pattern with placeholders.
pub fn generate_pattern<R: Rng + ?Sized>(pattern: &str, rng: &mut R, index: u64) -> Value {
    let mut result = pattern.replace("{index}", &index.to_string());

    while result.contains("{uuid}") {
        result = result.replacen("{uuid}", &random_uuid(rng).to_string(), 1);
    }

    // Replace {rand:N} left to right; an invalid width stops substitution.
    let mut search_from = 0;
    while let Some(offset) = result[search_from..].find("{rand:") {
        let start = search_from + offset;
        let Some(close) = result[start..].find('}') else {
            break;
        };
        let end = start + close;
        let Ok(digits) = result[start + 6..end].parse::<usize>() else {
            break;
        };
        let random_num = generate_random_digits(rng, digits);
        result = format!("{}{}{}", &result[..start], random_num, &result[end + 1..]);
        search_from = start + random_num.len();
    }

    Value::String(result)
}

/// Generate a random number with exactly N digits.
fn generate_random_digits<R: Rng + ?Sized>(rng: &mut R, digits: usize) -> String {
    let mut result = String::with_capacity(digits);
    for position in 0..digits {
        // No leading zero
        let low = if position == 0 { 1 } else { 0 };
        let digit: u8 = rng.random_range(low..10);
        result.push(char::from(b'0' + digit));
    }
    result
}
