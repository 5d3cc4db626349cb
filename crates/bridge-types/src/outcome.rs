//! Reply body carried in the `data` field of every reply envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::Payload;

/// Message used when a handler returns bare data.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Operation completed successfully";

/// `{ success, message, data }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable, actionable message.
    pub message: String,
    /// Optional result data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Outcome {
    /// Successful outcome without data.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    /// Failed outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// Successful outcome wrapping bare data with the default message.
    pub fn from_data(data: Value) -> Self {
        Self::success(DEFAULT_SUCCESS_MESSAGE).with_data(data)
    }

    /// Attach result data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize into an envelope payload.
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("success".to_owned(), Value::Bool(self.success));
        payload.insert("message".to_owned(), Value::String(self.message));
        if let Some(data) = self.data {
            payload.insert("data".to_owned(), data);
        }
        payload
    }

    /// Read a reply body leniently: a missing `success` counts as failure, a
    /// missing or non-string `message` becomes empty.
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            success: payload
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            message: payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            data: payload.get("data").filter(|v| !v.is_null()).cloned(),
        }
    }
}

impl From<Value> for Outcome {
    fn from(data: Value) -> Self {
        Self::from_data(data)
    }
}

impl From<Payload> for Outcome {
    fn from(data: Payload) -> Self {
        Self::from_data(Value::Object(data))
    }
}
