//! JSON parsing into the dynamic value.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Parses JSON text into a canonical [`Value`].
///
/// Object keys are sorted and numbers normalized during conversion, so the
/// result always satisfies `parse(canonicalize(v)) == v`.
pub fn parse(bytes: &[u8]) -> CodecResult<Value> {
    let raw: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::parse(e.to_string()))?;
    Ok(Value::from(raw))
}
