//! Handlers for the session messages the editor sends on its own:
//! `connection`, `disconnect` and `test`.
//!
//! Announced editors are tracked per connection. A socket that drops without
//! saying goodbye is pruned from the directory by [`prune_departed`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_engine::{
    current_connection, CommandHandler, ConnectionEvent, ConnectionId, DispatchEntry, Endpoint,
    HandlerError,
};
use bridge_types::{Outcome, CONNECTION_TYPE, DISCONNECT_TYPE, TEST_TYPE};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// `connection` payload
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Hello {
    pub client: String,
    pub version: String,
}

/// `disconnect` payload
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Goodbye {
    pub client: String,
}

/// `test` payload
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TestMessage {
    pub message: Option<Value>,
}

/// One announced editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorInfo {
    pub client: String,
    pub version: String,
}

/// Editors that have announced themselves, by the connection they came in on.
#[derive(Debug, Default)]
pub struct EditorDirectory {
    editors: RwLock<BTreeMap<ConnectionId, EditorInfo>>,
}

impl EditorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the editor on `connection`.
    pub fn announce(&self, connection: ConnectionId, info: EditorInfo) {
        self.editors.write().insert(connection, info);
    }

    /// Forget the editor on `connection`, returning it if one was announced.
    pub fn depart(&self, connection: ConnectionId) -> Option<EditorInfo> {
        self.editors.write().remove(&connection)
    }

    pub fn get(&self, connection: ConnectionId) -> Option<EditorInfo> {
        self.editors.read().get(&connection).cloned()
    }

    /// Drop every editor whose connection is not in `live`. Returns how many went.
    pub fn retain_live(&self, live: &[ConnectionId]) -> usize {
        let live: HashSet<ConnectionId> = live.iter().copied().collect();
        let mut editors = self.editors.write();
        let before = editors.len();
        editors.retain(|connection, _| live.contains(connection));
        before - editors.len()
    }

    /// Announced clients as `(name, version)`, in connection order.
    /// Two connections may announce the same name.
    pub fn clients(&self) -> Vec<(String, String)> {
        self.editors
            .read()
            .values()
            .map(|info| (info.client.clone(), info.version.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.editors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.editors.read().is_empty()
    }
}

fn origin() -> Result<ConnectionId, HandlerError> {
    current_connection().ok_or_else(|| HandlerError::new("not received on a connection"))
}

pub struct ConnectionHandler {
    directory: Arc<EditorDirectory>,
}

#[async_trait]
impl CommandHandler for ConnectionHandler {
    type Command = Hello;

    async fn handle(&self, hello: Hello) -> Result<Outcome, HandlerError> {
        let connection = origin()?;
        info!(
            connection_id = %connection,
            client = %hello.client,
            version = %hello.version,
            "Editor connected"
        );
        self.directory.announce(
            connection,
            EditorInfo {
                client: hello.client,
                version: hello.version,
            },
        );
        Ok(Outcome::success("Connection established successfully"))
    }
}

pub struct DisconnectHandler {
    directory: Arc<EditorDirectory>,
}

#[async_trait]
impl CommandHandler for DisconnectHandler {
    type Command = Goodbye;

    async fn handle(&self, goodbye: Goodbye) -> Result<Outcome, HandlerError> {
        let connection = origin()?;
        info!(connection_id = %connection, client = %goodbye.client, "Editor disconnected");
        self.directory.depart(connection);
        Ok(Outcome::success("Disconnection completed successfully"))
    }
}

/// Keep `directory` in step with the endpoint's connections until the
/// event channel closes.
///
/// `events` should be subscribed before the server starts accepting.
pub async fn prune_departed(
    mut events: broadcast::Receiver<ConnectionEvent>,
    endpoint: Endpoint,
    directory: Arc<EditorDirectory>,
) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Closed { id }) => {
                if let Some(editor) = directory.depart(id) {
                    info!(
                        connection_id = %id,
                        client = %editor.client,
                        "Editor dropped without disconnect"
                    );
                }
            }
            Ok(ConnectionEvent::Opened { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                let pruned = directory.retain_live(&endpoint.connections());
                warn!(missed = n, pruned = pruned, "Connection events lagged, resynced editors");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Connection events closed, editor pruning stopped");
                break;
            }
        }
    }
}

/// Dispatch entries for the session messages.
pub fn session_entries(directory: Arc<EditorDirectory>) -> Vec<DispatchEntry> {
    vec![
        DispatchEntry::handler(
            CONNECTION_TYPE,
            Arc::new(ConnectionHandler {
                directory: Arc::clone(&directory),
            }),
        ),
        DispatchEntry::handler(DISCONNECT_TYPE, Arc::new(DisconnectHandler { directory })),
        DispatchEntry::new(TEST_TYPE, |test: TestMessage| async move {
            if let Some(message) = test.message {
                info!(message = %message, "Test message received");
            }
            Ok(Outcome::success("Test message received successfully"))
        }),
    ]
}
