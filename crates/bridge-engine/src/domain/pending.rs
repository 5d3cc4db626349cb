//! Pending Request Store - the correlation table.
//!
//! Maps correlation ids to callers waiting for the peer's reply.
//!
//! Flow:
//! 1. The caller assigns an id to the outbound envelope
//! 2. The caller calls `register()` and gets a [`PendingReply`]
//! 3. The envelope is written to the peer(s)
//! 4. The session loop reads the reply and calls `try_resolve()`
//! 5. The caller awaits [`PendingReply::wait`] or times out
//!
//! Every waiter is resolved exactly once: the entry is removed from the map
//! before anything is delivered, so whichever of resolve, timeout, cancel or
//! abandon removes it first is the only one that acts.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bridge_types::Envelope;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::RequestError;

/// A caller waiting for a reply
struct PendingRequest {
    /// Channel to deliver the reply
    sender: oneshot::Sender<Envelope>,
    /// When the waiter was registered
    created_at: Instant,
    /// Request type (for logging)
    message_type: String,
}

/// Statistics for the pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total waiters registered
    pub total_registered: AtomicU64,
    /// Total waiters resolved with a reply
    pub total_completed: AtomicU64,
    /// Total waiters that timed out
    pub total_timeouts: AtomicU64,
    /// Total waiters cancelled by shutdown or dropped by their caller
    pub total_cancelled: AtomicU64,
    /// Total replies dropped because their waiter had already expired
    pub total_late_replies: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub late_replies: u64,
    pub pending: usize,
}

/// Bounded FIFO set of ids whose waiters are gone or already answered.
struct ExpiredIds {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl ExpiredIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            members: HashSet::new(),
            capacity,
        }
    }

    fn insert(&mut self, id: String) {
        if self.capacity == 0 || self.members.contains(&id) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(id.clone());
        self.order.push_back(id);
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }
}

/// The correlation table.
pub struct PendingRequestStore {
    /// Map of correlation id to waiter
    pending: DashMap<String, PendingRequest>,
    /// Recently settled ids: timed out, abandoned, or already answered
    expired: Mutex<ExpiredIds>,
    /// Set by `cancel_all`; refuses new waiters until `reopen`
    closed: AtomicBool,
    /// Timeout used when the caller gives none
    default_timeout: Duration,
    /// Statistics
    stats: PendingStats,
}

impl PendingRequestStore {
    /// Create a new pending request store
    pub fn new(default_timeout: Duration, expired_id_capacity: usize) -> Self {
        Self {
            pending: DashMap::new(),
            expired: Mutex::new(ExpiredIds::new(expired_id_capacity)),
            closed: AtomicBool::new(false),
            default_timeout,
            stats: PendingStats::default(),
        }
    }

    /// Register a waiter for `id`.
    ///
    /// The returned [`PendingReply`] removes the entry when dropped, so a
    /// caller that gives up never leaks its waiter.
    pub fn register(
        self: &Arc<Self>,
        id: &str,
        message_type: &str,
        timeout: Option<Duration>,
    ) -> Result<PendingReply, RequestError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RequestError::ShuttingDown);
        }

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RequestError::DuplicateId(id.to_owned()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    sender: tx,
                    created_at: Instant::now(),
                    message_type: message_type.to_owned(),
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = id,
            message_type = message_type,
            "Registered pending request"
        );

        Ok(PendingReply {
            store: Arc::clone(self),
            id: id.to_owned(),
            timeout: timeout.unwrap_or(self.default_timeout),
            receiver: rx,
            settled: false,
        })
    }

    /// Register and wait in one step.
    pub async fn await_reply(
        self: &Arc<Self>,
        id: &str,
        message_type: &str,
        timeout: Option<Duration>,
    ) -> Result<Envelope, RequestError> {
        self.register(id, message_type, timeout)?.wait().await
    }

    /// Complete the waiter matching the envelope's id.
    ///
    /// Hands the envelope back when there is no such waiter so the caller
    /// can route it elsewhere.
    pub fn try_resolve(&self, envelope: Envelope) -> Result<(), Envelope> {
        if !envelope.has_id() {
            return Err(envelope);
        }
        match self.pending.remove(&envelope.id) {
            Some((id, pending)) => {
                self.deliver(id, pending, envelope);
                Ok(())
            }
            None => Err(envelope),
        }
    }

    /// Complete the waiter for `id`.
    ///
    /// Returns true if a waiter was found, false if unknown or already resolved.
    pub fn resolve(&self, id: &str, envelope: Envelope) -> bool {
        match self.pending.remove(id) {
            Some((id, pending)) => {
                self.deliver(id, pending, envelope);
                true
            }
            None => false,
        }
    }

    fn deliver(&self, id: String, pending: PendingRequest, envelope: Envelope) {
        let response_time = pending.created_at.elapsed();
        match pending.sender.send(envelope) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    message_type = pending.message_type,
                    elapsed_ms = response_time.as_millis() as u64,
                    "Completed pending request"
                );
                // Further replies to a broadcast request are duplicates, not commands.
                self.expired.lock().insert(id);
            }
            Err(_) => {
                // Receiver dropped between our removal and its own cleanup
                self.stats.total_late_replies.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %id,
                    message_type = pending.message_type,
                    "Pending request receiver dropped"
                );
                self.expired.lock().insert(id);
            }
        }
    }

    /// Remove a waiter whose deadline passed. False if someone else got there first.
    fn expire(&self, id: &str, after: Duration) -> bool {
        match self.pending.remove(id) {
            Some((id, pending)) => {
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %id,
                    message_type = pending.message_type,
                    timeout_ms = after.as_millis() as u64,
                    "Pending request timed out"
                );
                self.expired.lock().insert(id);
                true
            }
            None => false,
        }
    }

    /// Remove a waiter whose caller went away.
    fn abandon(&self, id: &str) {
        if let Some((id, pending)) = self.pending.remove(id) {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %id,
                message_type = pending.message_type,
                "Pending request abandoned by caller"
            );
            self.expired.lock().insert(id);
        }
    }

    /// Cancel a single waiter. Its caller sees [`RequestError::Cancelled`].
    pub fn cancel(&self, id: &str) -> bool {
        if self.pending.remove(id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Cancel every waiter and refuse new ones. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let cancelled = ids.iter().filter(|id| self.cancel(id)).count();
        if cancelled > 0 {
            debug!(cancelled = cancelled, "Cancelled pending requests");
        }
        cancelled
    }

    /// Accept new waiters again after `cancel_all`.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    /// Returns true if a late reply for `id` should be dropped.
    pub fn was_expired(&self, id: &str) -> bool {
        self.expired.lock().contains(id)
    }

    /// Count a reply dropped because its waiter was already settled.
    pub fn record_late_reply(&self) {
        self.stats.total_late_replies.fetch_add(1, Ordering::Relaxed);
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a correlation id is pending
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.stats.total_registered.load(Ordering::Relaxed),
            completed: self.stats.total_completed.load(Ordering::Relaxed),
            timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            late_replies: self.stats.total_late_replies.load(Ordering::Relaxed),
            pending: self.pending.len(),
        }
    }
}

/// A registered waiter.
///
/// Dropping it before it settles removes the entry from the store.
pub struct PendingReply {
    store: Arc<PendingRequestStore>,
    id: String,
    timeout: Duration,
    receiver: oneshot::Receiver<Envelope>,
    settled: bool,
}

impl PendingReply {
    /// Correlation id of this waiter.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deadline applied by [`wait`](Self::wait).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the reply, the deadline, or cancellation.
    pub async fn wait(mut self) -> Result<Envelope, RequestError> {
        let outcome = tokio::time::timeout(self.timeout, &mut self.receiver).await;
        self.settled = true;
        match outcome {
            Ok(Ok(envelope)) => Ok(envelope),
            Ok(Err(_)) => Err(RequestError::Cancelled {
                id: self.id.clone(),
            }),
            Err(_) => {
                if self.store.expire(&self.id, self.timeout) {
                    return Err(RequestError::Timeout {
                        id: self.id.clone(),
                        after: self.timeout,
                    });
                }
                // Lost the race: whoever removed the entry sends or drops right away.
                match (&mut self.receiver).await {
                    Ok(envelope) => Ok(envelope),
                    Err(_) => Err(RequestError::Cancelled {
                        id: self.id.clone(),
                    }),
                }
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            self.store.abandon(&self.id);
        }
    }
}
