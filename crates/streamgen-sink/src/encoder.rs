//! Record to message encoding.
//!
//! Values are JSON objects; the key is the string form of the key field.

use crate::error::SinkError;
use crate::sink::OutboundMessage;
use streamgen_core::{Record, Value};

/// Encode a record into a message for `topic`.
///
/// A missing or null key field produces an unkeyed message.
pub fn encode_record(
    topic: &str,
    record: &Record,
    key_field: Option<&str>,
) -> Result<OutboundMessage, SinkError> {
    let value = serde_json::to_vec(&record.to_json())?;
    let key = key_field
        .and_then(|field| record.get(field))
        .and_then(get_message_key);
    Ok(OutboundMessage::new(topic, key, value))
}

/// Key bytes for a value.
pub fn get_message_key(value: &Value) -> Option<Vec<u8>> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string().into_bytes())
    }
}
