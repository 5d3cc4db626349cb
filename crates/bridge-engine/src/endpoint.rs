//! # Endpoint
//!
//! One engine instance: the connection registry, the correlation table and
//! the dispatch table, plus the shutdown signal every session listens to.
//! Both the listening end ([`BridgeServer`](crate::BridgeServer)) and the
//! connecting end ([`BridgeClient`](crate::BridgeClient)) wrap one.
//!
//! Each end is both a requester and a responder: `send_and_wait` registers a
//! waiter before writing, and the session loop of every connection resolves
//! waiters from inbound replies or dispatches inbound commands.

use std::sync::Arc;
use std::time::Duration;

use bridge_types::Envelope;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dispatch::DispatchRegistry;
use crate::domain::{
    EngineConfig, FrameError, PendingRequestStore, PendingStatsSnapshot, RequestError, SendError,
};
use crate::transport::session;
use crate::transport::{
    BoxedWriter, BroadcastReport, ConnectionEvent, ConnectionHandle, ConnectionId,
    ConnectionRegistry,
};

/// Buffered lifecycle events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 64;

struct EndpointInner {
    config: EngineConfig,
    connections: ConnectionRegistry,
    pending: Arc<PendingRequestStore>,
    dispatch: Arc<DispatchRegistry>,
    shutdown: watch::Sender<bool>,
    events: broadcast::Sender<ConnectionEvent>,
    sessions: Mutex<JoinSet<()>>,
}

/// Shared engine instance. Cheap to clone.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    pub fn new(config: EngineConfig, dispatch: Arc<DispatchRegistry>) -> Self {
        let pending = Arc::new(PendingRequestStore::new(
            config.default_timeout,
            config.expired_id_capacity,
        ));
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(EndpointInner {
                config,
                connections: ConnectionRegistry::new(),
                pending,
                dispatch,
                shutdown,
                events,
                sessions: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn connection_registry(&self) -> &ConnectionRegistry {
        &self.inner.connections
    }

    pub fn pending(&self) -> &Arc<PendingRequestStore> {
        &self.inner.pending
    }

    pub fn dispatch_registry(&self) -> &Arc<DispatchRegistry> {
        &self.inner.dispatch
    }

    /// Take ownership of a stream and start its session loop.
    pub fn attach<S>(&self, stream: S, peer: impl Into<String>) -> ConnectionId
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.attach_parts(reader, Box::new(writer), peer)
    }

    /// Start a session over separate read and write halves.
    pub fn attach_parts<R>(&self, reader: R, writer: BoxedWriter, peer: impl Into<String>) -> ConnectionId
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let id = self.inner.connections.next_id();
        let handle = ConnectionHandle::new(
            id,
            peer.clone(),
            writer,
            self.inner.config.max_frame_size,
            self.inner.config.write_timeout,
        );
        self.inner.connections.register(handle.clone());
        info!(connection_id = %id, peer = %peer, "Peer connected");
        self.publish(ConnectionEvent::Opened { id, peer });

        let shutdown = self.inner.shutdown.subscribe();
        let task = session::run(self.clone(), handle, reader, shutdown);
        {
            let mut sessions = self.inner.sessions.lock();
            while sessions.try_join_next().is_some() {}
            sessions.spawn(task);
        }
        id
    }

    /// Subscribe to connection lifecycle events.
    ///
    /// `Closed` is published once the session has ended and the connection
    /// has left the registry.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Send a request to every live connection and wait for the first reply
    /// carrying its id.
    ///
    /// Assigns a fresh correlation id when the envelope has none. The waiter
    /// is registered before anything is written, so a fast reply cannot be
    /// missed.
    pub async fn send_and_wait(
        &self,
        mut envelope: Envelope,
        timeout: Option<Duration>,
    ) -> Result<Envelope, RequestError> {
        if self.inner.connections.is_empty() {
            return Err(RequestError::NoPeer);
        }
        let id = envelope.ensure_id().to_owned();
        let waiter = self
            .inner
            .pending
            .register(&id, &envelope.message_type, timeout)?;

        let report = self.inner.connections.broadcast(&envelope).await?;
        if report.delivered == 0 {
            return Err(RequestError::NoPeer);
        }
        debug!(
            correlation_id = %id,
            message_type = %envelope.message_type,
            delivered = report.delivered,
            "Request sent"
        );
        waiter.wait().await
    }

    /// Unicast variant of [`send_and_wait`](Self::send_and_wait).
    pub async fn request(
        &self,
        connection: ConnectionId,
        mut envelope: Envelope,
        timeout: Option<Duration>,
    ) -> Result<Envelope, RequestError> {
        if !self.inner.connections.contains(connection) {
            return Err(RequestError::UnknownConnection(connection));
        }
        let id = envelope.ensure_id().to_owned();
        let waiter = self
            .inner
            .pending
            .register(&id, &envelope.message_type, timeout)?;

        match self.inner.connections.send_to(connection, &envelope).await {
            Ok(()) => waiter.wait().await,
            Err(SendError::Closed(id)) => Err(RequestError::UnknownConnection(id)),
            Err(error) => Err(error.into()),
        }
    }

    /// Fire-and-forget broadcast; no waiter is registered.
    pub async fn notify(&self, envelope: Envelope) -> Result<BroadcastReport, RequestError> {
        if self.inner.connections.is_empty() {
            return Err(RequestError::NoPeer);
        }
        Ok(self.inner.connections.broadcast(&envelope).await?)
    }

    /// Write an envelope to every live connection as-is.
    pub async fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastReport, FrameError> {
        self.inner.connections.broadcast(envelope).await
    }

    /// Write an envelope to one connection as-is.
    pub async fn send_to(&self, connection: ConnectionId, envelope: &Envelope) -> Result<(), SendError> {
        self.inner.connections.send_to(connection, envelope).await
    }

    /// Ids of every live connection.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.inner.connections.ids()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    pub fn stats(&self) -> PendingStatsSnapshot {
        self.inner.pending.snapshot()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Signal every session and waiter to stop. Does not wait.
    pub fn begin_shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        self.inner.pending.cancel_all();
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Cancel waiters, close every connection and wait for the session loops
    /// to finish. Sessions still running after the drain timeout are aborted.
    pub async fn shutdown(&self) {
        self.begin_shutdown();
        self.inner.connections.close_all().await;

        let mut sessions = std::mem::take(&mut *self.inner.sessions.lock());
        let drain = async { while sessions.join_next().await.is_some() {} };
        if tokio::time::timeout(self.inner.config.drain_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                remaining = sessions.len(),
                "Sessions did not finish in time, aborting"
            );
            sessions.shutdown().await;
        }
        debug!("Endpoint shut down");
    }

    /// Accept new sessions and waiters again after a shutdown.
    pub fn reopen(&self) {
        self.inner.pending.reopen();
        self.inner.shutdown.send_replace(false);
    }
}

/// Resolves once shutdown is signalled or the signal is gone.
///
/// The watch guard is released before returning, so the future can sit in a
/// `select!` whose other arms await.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
