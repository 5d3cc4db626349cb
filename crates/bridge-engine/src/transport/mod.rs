//! Byte-stream transport: framing, live connections, and the per-connection
//! session loop.

pub mod connection;
pub mod framer;
pub(crate) mod session;

pub use connection::{
    BoxedWriter, BroadcastReport, ConnectionEvent, ConnectionHandle, ConnectionId,
    ConnectionRegistry,
};
pub use framer::{encode, EnvelopeFramer, DELIMITER};
