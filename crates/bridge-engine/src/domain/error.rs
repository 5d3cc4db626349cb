//! Engine error types.
//!
//! Every failure a caller can observe is one of these enums. Tool-level
//! callers convert a [`RequestError`] into an [`Outcome`] so they always get
//! a structured `success = false` result instead of an exception.

use std::io;
use std::time::Duration;

use bridge_types::Outcome;

use crate::server::ServerState;
use crate::transport::ConnectionId;

use super::config::ConfigError;

/// Framing failures. Both are fatal for the connection that produced them.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Bytes that do not form a valid envelope
    #[error("{0}")]
    Decode(String),
    /// A frame grew past the configured limit
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    /// The envelope could not be serialized
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure to write a frame to one connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection is already closed
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    /// Socket write failed
    #[error("write to {connection} failed: {source}")]
    Io {
        connection: ConnectionId,
        #[source]
        source: io::Error,
    },
    /// The peer stopped reading
    #[error("write to {connection} timed out after {after:?}")]
    TimedOut {
        connection: ConnectionId,
        after: Duration,
    },
    /// Encoding failed before anything was written
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Failures raised while dispatching an inbound command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No handler registered for the type
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    /// Payload does not match the handler's command shape
    #[error("Error processing message {message_type}: {reason}")]
    Decode {
        message_type: String,
        reason: String,
    },
    /// The handler returned an error or panicked
    #[error("Error processing message {message_type}: {reason}")]
    HandlerFault {
        message_type: String,
        reason: String,
    },
}

/// Dispatch registry construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two handlers claimed the same message type
    #[error("duplicate handler for message type: {0}")]
    DuplicateType(String),
}

/// Failures of an outbound request awaiting its reply.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No connection to send to
    #[error("no peer connected")]
    NoPeer,
    /// The named connection is not registered
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    /// No reply within the deadline
    #[error("timed out after {after:?} waiting for reply to {id}")]
    Timeout { id: String, after: Duration },
    /// The waiter was cancelled by shutdown
    #[error("request {id} cancelled by shutdown")]
    Cancelled { id: String },
    /// The engine is shutting down and accepts no new waiters
    #[error("shutdown in progress")]
    ShuttingDown,
    /// A waiter with this id is already outstanding
    #[error("duplicate correlation id: {0}")]
    DuplicateId(String),
    /// Writing the request failed
    #[error(transparent)]
    Send(#[from] SendError),
    /// The request could not be framed
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl RequestError {
    /// Returns true if the request ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<RequestError> for Outcome {
    fn from(error: RequestError) -> Self {
        let message = match &error {
            RequestError::NoPeer | RequestError::UnknownConnection(_) => {
                "No peer connected".to_owned()
            }
            RequestError::Timeout { .. } => "Timeout waiting for peer response".to_owned(),
            other => other.to_string(),
        };
        Outcome::failure(message)
    }
}

/// Listening end lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `start` called while not stopped
    #[error("server is not stopped (state: {0:?})")]
    AlreadyRunning(ServerState),
    /// The address could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Connecting end errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// TCP connect failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Error returned by a command handler. The message travels to the peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self(error.to_string())
    }
}
