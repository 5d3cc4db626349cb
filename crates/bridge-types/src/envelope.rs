//! # Envelope
//!
//! The unit wire message: a type tag, a correlation id and an opaque,
//! order-preserving payload map.
//!
//! Decoding also accepts the PascalCase spellings (`Type`, `Id`, `Data`)
//! emitted by older editor plugins. Encoding always uses lowercase keys.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::outcome::Outcome;
use crate::{ERROR_TYPE, RESPONSE_TYPE};

/// Command-specific fields. Values are dynamically typed JSON trees.
pub type Payload = serde_json::Map<String, Value>;

/// Correlation identifier linking a request to its eventual reply.
///
/// Equality is exact string match; peers may send any opaque string, so
/// no normalisation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh id (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// The wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Command/event discriminator.
    #[serde(rename = "type", alias = "Type")]
    pub message_type: String,

    /// Correlation id. Empty means "none".
    #[serde(default, alias = "Id", deserialize_with = "nullable")]
    pub id: String,

    /// Command-specific payload.
    #[serde(default, alias = "Data", deserialize_with = "nullable")]
    pub data: Payload,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Envelope {
    /// Create an envelope without a correlation id.
    pub fn new(message_type: impl Into<String>, data: Payload) -> Self {
        Self {
            message_type: message_type.into(),
            id: String::new(),
            data,
        }
    }

    /// Create an envelope with an empty payload.
    pub fn empty(message_type: impl Into<String>) -> Self {
        Self::new(message_type, Payload::new())
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Returns true if the envelope carries a correlation id.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Assign a fresh correlation id if none is set, and return it.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = CorrelationId::generate().into_string();
        }
        &self.id
    }

    /// Build a reply of the given type that echoes this envelope's id.
    pub fn reply(&self, message_type: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            message_type: message_type.into(),
            id: self.id.clone(),
            data: outcome.into_payload(),
        }
    }

    /// Build an `"error"` reply that echoes this envelope's id.
    pub fn error_reply(&self, message: impl Into<String>) -> Self {
        self.reply(ERROR_TYPE, Outcome::failure(message))
    }

    /// A standalone `"response"` envelope.
    pub fn response(outcome: Outcome) -> Self {
        Self::new(RESPONSE_TYPE, outcome.into_payload())
    }

    /// A standalone `"error"` envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR_TYPE, Outcome::failure(message).into_payload())
    }

    /// Returns true if this is an `"error"` envelope.
    pub fn is_error(&self) -> bool {
        self.message_type == ERROR_TYPE
    }

    /// Read the payload as a reply body.
    pub fn outcome(&self) -> Outcome {
        Outcome::from_payload(&self.data)
    }
}
