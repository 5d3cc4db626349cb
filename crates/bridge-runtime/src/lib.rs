//! # Bridge Runtime
//!
//! The agent-facing side of the bridge: a listening [`BridgeServer`] with
//! the session handlers registered, plus a [`ToolRelay`] that forwards
//! typed tool commands to whichever editor is connected.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize logging
//! 3. Build the dispatch table (`connection`, `disconnect`, `test`)
//! 4. Bind and start accepting editors
//! 5. Relay tool calls until Ctrl+C, then drain and stop

pub mod config;
pub mod handlers;
pub mod relay;
pub mod telemetry;

use std::net::SocketAddr;
use std::sync::Arc;

use bridge_engine::{BridgeServer, DispatchRegistry, RegistryError, ServerError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub use config::RuntimeConfig;
pub use handlers::{EditorDirectory, EditorInfo};
pub use relay::ToolRelay;

/// Runtime construction and startup errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Build the dispatch table the runtime serves.
pub fn build_registry(editors: Arc<EditorDirectory>) -> Result<DispatchRegistry, RegistryError> {
    DispatchRegistry::from_entries(handlers::session_entries(editors))
}

pub struct BridgeRuntime {
    server: BridgeServer,
    relay: ToolRelay,
    editors: Arc<EditorDirectory>,
    pruning: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let editors = Arc::new(EditorDirectory::new());
        let registry = Arc::new(build_registry(Arc::clone(&editors))?);
        let server = BridgeServer::new(config.server.clone(), registry)?;
        let relay = ToolRelay::new(server.endpoint().clone());
        Ok(Self {
            server,
            relay,
            editors,
            pruning: Mutex::new(None),
        })
    }

    /// Bind the listener. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, RuntimeError> {
        let endpoint = self.server.endpoint();
        let events = endpoint.subscribe();
        let addr = self.server.start().await?;
        let pruning = tokio::spawn(handlers::prune_departed(
            events,
            endpoint.clone(),
            Arc::clone(&self.editors),
        ));
        if let Some(previous) = self.pruning.lock().replace(pruning) {
            previous.abort();
        }
        info!("===========================================");
        info!("  Editor Bridge Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("  Listening on {addr}");
        info!("===========================================");
        Ok(addr)
    }

    pub fn server(&self) -> &BridgeServer {
        &self.server
    }

    pub fn relay(&self) -> &ToolRelay {
        &self.relay
    }

    pub fn editors(&self) -> &Arc<EditorDirectory> {
        &self.editors
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        self.server.stop().await;
        if let Some(pruning) = self.pruning.lock().take() {
            pruning.abort();
        }
        self.editors.retain_live(&self.server.endpoint().connections());
        info!("Shutdown complete");
    }
}
