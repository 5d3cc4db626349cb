//! Per-connection receive loop.
//!
//! Reads chunks, feeds the framer, and routes each envelope:
//! 1. an id matching a pending waiter resolves that waiter
//! 2. a late or duplicate reply to a settled waiter is dropped
//! 3. an unmatched `"response"` / `"error"` is dropped
//! 4. anything else is dispatched as a command on its own task, and the
//!    reply is written back to this connection
//!
//! Commands run off the read loop so that a handler may itself call
//! `send_and_wait` on the same connection without deadlocking.

use bridge_types::{is_reply_type, Envelope};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::framer::EnvelopeFramer;
use super::{ConnectionEvent, ConnectionHandle};
use crate::domain::FrameError;
use crate::endpoint::{shutdown_requested, Endpoint};

#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Closed,
    Eof,
    Io(std::io::Error),
    Frame(FrameError),
}

pub(crate) async fn run<R>(
    endpoint: Endpoint,
    handle: ConnectionHandle,
    mut reader: R,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let config = endpoint.config().clone();
    let mut framer = EnvelopeFramer::new(config.max_frame_size);
    let mut chunk = vec![0u8; config.read_chunk_size];
    let mut commands = JoinSet::new();

    let end = loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break SessionEnd::Shutdown,
            _ = handle.closed() => break SessionEnd::Closed,
            Some(_) = commands.join_next(), if !commands.is_empty() => {}
            read = reader.read(&mut chunk) => match read {
                Ok(0) => break SessionEnd::Eof,
                Ok(n) => {
                    framer.extend(&chunk[..n]);
                    if let Err(error) = drain_frames(&endpoint, &handle, &mut framer, &mut commands) {
                        reject(&handle, &error).await;
                        break SessionEnd::Frame(error);
                    }
                }
                Err(error) => break SessionEnd::Io(error),
            },
        }
    };

    // Unregistered before the drain, so nothing new is addressed to this peer.
    endpoint.connection_registry().unregister(handle.id());

    // A peer that sends a command and hangs up still gets it executed.
    if matches!(end, SessionEnd::Eof) && !commands.is_empty() {
        let drain = async { while commands.join_next().await.is_some() {} };
        if tokio::time::timeout(config.drain_timeout, drain).await.is_err() {
            debug!(connection_id = %handle.id(), "In-flight commands outlived the drain timeout");
        }
    }
    commands.abort_all();
    handle.close().await;
    endpoint.publish(ConnectionEvent::Closed { id: handle.id() });

    match end {
        SessionEnd::Shutdown => {
            debug!(connection_id = %handle.id(), "Session stopped by shutdown");
        }
        SessionEnd::Closed => {
            debug!(connection_id = %handle.id(), "Session closed locally");
        }
        SessionEnd::Eof => {
            info!(connection_id = %handle.id(), peer = %handle.peer(), "Peer disconnected");
        }
        SessionEnd::Io(error) => {
            warn!(connection_id = %handle.id(), error = %error, "Read failed, closing connection");
        }
        SessionEnd::Frame(error) => {
            warn!(connection_id = %handle.id(), error = %error, "Malformed frame, closing connection");
        }
    }
}

fn drain_frames(
    endpoint: &Endpoint,
    handle: &ConnectionHandle,
    framer: &mut EnvelopeFramer,
    commands: &mut JoinSet<()>,
) -> Result<(), FrameError> {
    while let Some(envelope) = framer.next_envelope()? {
        route(endpoint, handle, envelope, commands);
    }
    Ok(())
}

fn route(
    endpoint: &Endpoint,
    handle: &ConnectionHandle,
    envelope: Envelope,
    commands: &mut JoinSet<()>,
) {
    let pending = endpoint.pending();
    let envelope = match pending.try_resolve(envelope) {
        Ok(()) => return,
        Err(unmatched) => unmatched,
    };

    if envelope.has_id() && pending.was_expired(&envelope.id) {
        pending.record_late_reply();
        debug!(
            connection_id = %handle.id(),
            correlation_id = %envelope.id,
            message_type = %envelope.message_type,
            "Dropping late reply"
        );
        return;
    }

    if is_reply_type(&envelope.message_type) {
        debug!(
            connection_id = %handle.id(),
            correlation_id = %envelope.id,
            message_type = %envelope.message_type,
            "Dropping unmatched reply"
        );
        return;
    }

    let dispatch = endpoint.dispatch_registry().clone();
    let handle = handle.clone();
    commands.spawn(async move {
        let reply = dispatch.dispatch_from(handle.id(), envelope).await;
        if let Err(error) = handle.send(&reply).await {
            warn!(
                connection_id = %handle.id(),
                correlation_id = %reply.id,
                error = %error,
                "Failed to write reply"
            );
        }
    });
}

/// Best-effort error reply before a malformed stream is closed.
async fn reject(handle: &ConnectionHandle, error: &FrameError) {
    let message = match error {
        FrameError::Decode(reason) => format!("Invalid JSON format: {reason}"),
        other => other.to_string(),
    };
    let _ = handle.send(&Envelope::error(message)).await;
}
