//! Live connections and the registry that owns them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_types::Envelope;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::framer;
use crate::domain::{FrameError, SendError};

/// Write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection lifecycle, as seen by [`Endpoint::subscribe`](crate::Endpoint::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Registered and about to start its session
    Opened { id: ConnectionId, peer: String },
    /// Session over and unregistered
    Closed { id: ConnectionId },
}

struct HandleInner {
    id: ConnectionId,
    peer: String,
    /// `None` once closed
    writer: Mutex<Option<BoxedWriter>>,
    closed: watch::Sender<bool>,
    max_frame_size: usize,
    write_timeout: Duration,
}

/// Cloneable handle to one live connection.
///
/// Writes are serialized through an async mutex so that concurrent senders
/// never interleave bytes of different frames.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        peer: impl Into<String>,
        writer: BoxedWriter,
        max_frame_size: usize,
        write_timeout: Duration,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                id,
                peer: peer.into(),
                writer: Mutex::new(Some(writer)),
                closed,
                max_frame_size,
                write_timeout,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Remote address or label.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Encode and write one envelope.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        let frame = framer::encode(envelope, self.inner.max_frame_size)?;
        self.send_frame(&frame).await
    }

    /// Write an already encoded frame.
    pub async fn send_frame(&self, frame: &[u8]) -> Result<(), SendError> {
        let id = self.inner.id;
        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::Closed(id))?;

        let write = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.inner.write_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(SendError::Io {
                connection: id,
                source,
            }),
            Err(_) => Err(SendError::TimedOut {
                connection: id,
                after: self.inner.write_timeout,
            }),
        }
    }

    /// Close the write half and wake the session loop. Idempotent.
    pub async fn close(&self) {
        self.inner.closed.send_replace(true);
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
            debug!(connection_id = %self.inner.id, peer = %self.inner.peer, "Connection closed");
        }
    }
}

/// Result of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the frame
    pub delivered: usize,
    /// Connections whose write failed; they have been unregistered
    pub failed: Vec<ConnectionId>,
}

/// Thread-safe map of live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new connection.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register(&self, handle: ConnectionHandle) {
        let id = handle.id();
        let peer = handle.peer().to_owned();
        self.connections.write().insert(id, handle);
        debug!(connection_id = %id, peer = %peer, "Registered connection");
    }

    /// Remove a connection. Returns it if it was still registered.
    pub fn unregister(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let removed = self.connections.write().remove(&id);
        if removed.is_some() {
            debug!(connection_id = %id, "Unregistered connection");
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    /// Copy of every live handle, ordered by id.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<ConnectionHandle> =
            self.connections.read().values().cloned().collect();
        handles.sort_by_key(ConnectionHandle::id);
        handles
    }

    /// Ids of every live connection, ordered.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Write one envelope to every live connection.
    ///
    /// Encodes once, writes concurrently. A connection whose write fails is
    /// unregistered and closed without affecting delivery to the others.
    pub async fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastReport, FrameError> {
        let handles = self.snapshot();
        let Some(first) = handles.first() else {
            return Ok(BroadcastReport::default());
        };
        let frame = framer::encode(envelope, first.inner.max_frame_size)?;

        let results = join_all(handles.iter().map(|handle| handle.send_frame(&frame))).await;

        let mut report = BroadcastReport::default();
        for (handle, result) in handles.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        connection_id = %handle.id(),
                        message_type = %envelope.message_type,
                        error = %error,
                        "Broadcast write failed, dropping connection"
                    );
                    self.drop_connection(handle).await;
                    report.failed.push(handle.id());
                }
            }
        }
        Ok(report)
    }

    /// Write one envelope to a single connection.
    ///
    /// A failed write unregisters and closes that connection.
    pub async fn send_to(&self, id: ConnectionId, envelope: &Envelope) -> Result<(), SendError> {
        let handle = self.get(id).ok_or(SendError::Closed(id))?;
        match handle.send(envelope).await {
            Err(SendError::Frame(error)) => Err(SendError::Frame(error)),
            Err(error) => {
                warn!(connection_id = %id, error = %error, "Write failed, dropping connection");
                self.drop_connection(&handle).await;
                Err(error)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn drop_connection(&self, handle: &ConnectionHandle) {
        self.unregister(handle.id());
        handle.close().await;
    }

    /// Unregister and close every connection.
    pub async fn close_all(&self) {
        let handles: Vec<ConnectionHandle> = {
            let mut connections = self.connections.write();
            connections.drain().map(|(_, handle)| handle).collect()
        };
        join_all(handles.iter().map(|handle| handle.close())).await;
    }
}
