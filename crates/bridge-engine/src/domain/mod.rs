//! Domain types for the bridge engine.
//!
//! Configuration, the error taxonomy, and the correlation table.

pub mod config;
pub mod error;
pub mod pending;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError, EngineConfig, ServerConfig};
pub use error::{
    ConnectError, DispatchError, FrameError, HandlerError, RegistryError, RequestError,
    SendError, ServerError,
};
pub use pending::{PendingReply, PendingRequestStore, PendingStats, PendingStatsSnapshot};
