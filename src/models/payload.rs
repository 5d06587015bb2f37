//! Opaque event payloads.
//!
//! The engine never imposes a schema on what a business event carries. A
//! payload is kept as the exact JSON text it was created from, stored as-is,
//! and embedded verbatim into every delivery body, including replays.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// JSON payload of a business event, kept as raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPayload(Box<RawValue>);

impl EventPayload {
    /// Wraps a JSON document without re-encoding it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `json` is not a valid JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        RawValue::from_string(json.to_string())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("payload is not valid JSON: {e}")))
    }

    /// Serializes any value into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value cannot be serialized.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::value::to_raw_value(value)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("payload cannot be serialized: {e}")))
    }

    /// Returns the payload as a raw JSON value for embedding.
    #[must_use]
    pub fn as_raw(&self) -> &RawValue {
        &self.0
    }

    /// Returns the payload JSON text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for EventPayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for EventPayload {}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
