//! Listening end of the bridge.
//!
//! Lifecycle: `Stopped → Starting → Listening → Draining → Stopped`.
//! A stopped server may be started again.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::dispatch::DispatchRegistry;
use crate::domain::{ServerConfig, ServerError};
use crate::endpoint::{shutdown_requested, Endpoint};

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Draining,
}

/// TCP listener that accepts editor connections and runs a session per
/// connection on a shared [`Endpoint`].
pub struct BridgeServer {
    config: ServerConfig,
    endpoint: Endpoint,
    state: Mutex<ServerState>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl BridgeServer {
    /// Create a server. Validates the configuration; nothing is bound yet.
    pub fn new(config: ServerConfig, dispatch: Arc<DispatchRegistry>) -> Result<Self, ServerError> {
        config.validate()?;
        let endpoint = Endpoint::new(config.engine.clone(), dispatch);
        Ok(Self {
            config,
            endpoint,
            state: Mutex::new(ServerState::Stopped),
            accept_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The engine instance shared by every accepted connection.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Bound address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind and start accepting. Returns the bound address, so binding port
    /// 0 reveals the ephemeral port.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        {
            let mut state = self.state.lock();
            if *state != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning(*state));
            }
            *state = ServerState::Starting;
        }
        self.endpoint.reopen();

        let addr = self.config.bind_addr();
        let bound = match TcpListener::bind(&addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(source) => Err(source),
        };
        let (listener, local) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                *self.state.lock() = ServerState::Stopped;
                return Err(ServerError::Bind { addr, source });
            }
        };

        let task = tokio::spawn(accept_loop(
            listener,
            self.endpoint.clone(),
            self.endpoint.shutdown_signal(),
        ));
        *self.accept_task.lock() = Some(task);
        *self.local_addr.lock() = Some(local);
        *self.state.lock() = ServerState::Listening;

        info!(addr = %local, "Bridge server listening");
        Ok(local)
    }

    /// Stop accepting, cancel outstanding waiters, close every connection
    /// and release the listening socket. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                ServerState::Stopped | ServerState::Draining => return,
                _ => *state = ServerState::Draining,
            }
        }
        info!("Bridge server draining");

        self.endpoint.begin_shutdown();
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!(error = %error, "Accept loop ended abnormally");
            }
        }
        self.endpoint.shutdown().await;

        *self.local_addr.lock() = None;
        *self.state.lock() = ServerState::Stopped;
        info!("Bridge server stopped");
    }
}

async fn accept_loop(listener: TcpListener, endpoint: Endpoint, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(error) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %error, "Failed to set TCP_NODELAY");
                    }
                    endpoint.attach(stream, peer.to_string());
                }
                Err(error) => {
                    warn!(error = %error, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
    // Dropping the listener releases the port.
}
