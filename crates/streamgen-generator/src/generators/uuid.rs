//! UUID value generator.

use rand::Rng;
use streamgen_core::Value;
use uuid::Uuid;

/// Generate a random UUID v4 value using the provided RNG.
pub fn generate_uuid_v4<R: Rng + ?Sized>(rng: &mut R) -> Value {
    Value::Uuid(random_uuid(rng))
}

pub(crate) fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}
