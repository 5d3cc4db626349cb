//! # Bridge Engine
//!
//! Request/reply protocol engine over TCP, used by both ends of the
//! agent ↔ editor bridge.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │        BridgeServer (listens)    BridgeClient (connects)     │
//! │                  └──────────┬──────────┘                     │
//! │                          Endpoint                            │
//! │   ┌──────────────────┬──────┴─────────┬──────────────────┐   │
//! │   │ ConnectionRegistry│ PendingRequest │ DispatchRegistry │   │
//! │   │ (live writers)    │ Store (waiters)│ (type → handler) │   │
//! │   └─────────┬────────┴────────────────┴──────────────────┘   │
//! │             │  one session loop per connection               │
//! │        EnvelopeFramer  ⇄  newline-delimited JSON over TCP    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bridge_engine::{BridgeServer, DispatchRegistry, ServerConfig};
//!
//! let server = BridgeServer::new(ServerConfig::default(), Arc::new(DispatchRegistry::new()))?;
//! server.start().await?;
//! let reply = server
//!     .endpoint()
//!     .send_and_wait(Envelope::empty("read_console"), None)
//!     .await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod dispatch;
pub mod domain;
pub mod endpoint;
pub mod server;
pub mod transport;

// Re-exports for public API
pub use client::BridgeClient;
pub use dispatch::{current_connection, CommandHandler, DispatchEntry, DispatchRegistry};
pub use domain::config::{ClientConfig, EngineConfig, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use domain::error::{
    ConnectError, DispatchError, FrameError, HandlerError, RegistryError, RequestError,
    SendError, ServerError,
};
pub use domain::pending::{PendingRequestStore, PendingStatsSnapshot};
pub use endpoint::Endpoint;
pub use server::{BridgeServer, ServerState};
pub use transport::{BroadcastReport, ConnectionEvent, ConnectionId, EnvelopeFramer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
