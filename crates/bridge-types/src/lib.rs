//! # Bridge Types Crate
//!
//! Wire-level types shared by the listening end (the agent-facing server)
//! and the connecting end (the editor plugin).
//!
//! ## Wire shape
//!
//! ```text
//! { "type": "<message-type>", "id": "<correlation id>", "data": { ... } }
//! ```
//!
//! - `type` names a registered tool, or one of the reserved reply types
//!   `"response"` / `"error"`.
//! - `id` is generated by the sender of a request and echoed unchanged by
//!   the responder. Unsolicited envelopes carry a fresh id or none.
//! - `data` is an ordered map; replies carry an [`Outcome`]
//!   (`success`, `message`, `data`).

pub mod envelope;
pub mod outcome;
pub mod tools;

pub use envelope::{CorrelationId, Envelope, Payload};
pub use outcome::{Outcome, DEFAULT_SUCCESS_MESSAGE};
pub use tools::{
    ExecuteMenuItem, ManageAsset, ManageEditor, ManageGameObject, ManageScene, ManageScript,
    ReadConsole, ToolCommand,
};

/// Generic success reply type.
pub const RESPONSE_TYPE: &str = "response";

/// Failure reply type.
pub const ERROR_TYPE: &str = "error";

/// Sent by the editor right after it connects.
pub const CONNECTION_TYPE: &str = "connection";

/// Sent by the editor before it closes the stream.
pub const DISCONNECT_TYPE: &str = "disconnect";

/// Diagnostic round-trip message.
pub const TEST_TYPE: &str = "test";

/// Returns true for the reserved reply types, which are never dispatched as
/// commands.
#[must_use]
pub fn is_reply_type(message_type: &str) -> bool {
    message_type == RESPONSE_TYPE || message_type == ERROR_TYPE
}
