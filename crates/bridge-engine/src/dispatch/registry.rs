//! Message-type → handler table.
//!
//! Built once at startup from a list of [`DispatchEntry`] values and
//! immutable afterwards. Each entry decodes the payload into its command
//! type and runs the handler; every failure becomes an `"error"` reply
//! addressed to the request's id.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_types::{Envelope, Outcome, Payload, ToolCommand};
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{DispatchError, HandlerError, RegistryError};
use crate::transport::ConnectionId;

type Invoke = dyn Fn(Payload) -> BoxFuture<'static, Result<Outcome, DispatchError>> + Send + Sync;

tokio::task_local! {
    static ORIGIN: ConnectionId;
}

/// Connection the command being handled arrived on.
///
/// Set for the duration of [`DispatchRegistry::dispatch_from`], so handlers
/// can key per-peer state by connection. `None` anywhere else.
pub fn current_connection() -> Option<ConnectionId> {
    ORIGIN.try_with(|id| *id).ok()
}

/// Object-style handler, for handlers that carry state.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Payload shape this handler accepts.
    type Command: DeserializeOwned + Send + 'static;

    async fn handle(&self, command: Self::Command) -> Result<Outcome, HandlerError>;
}

/// One registered message type.
#[derive(Clone)]
pub struct DispatchEntry {
    message_type: String,
    invoke: Arc<Invoke>,
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

impl DispatchEntry {
    /// Register a closure taking the decoded command `C`.
    pub fn new<C, F, Fut>(message_type: impl Into<String>, handler: F) -> Self
    where
        C: DeserializeOwned + Send + 'static,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, HandlerError>> + Send + 'static,
    {
        let message_type = message_type.into();
        let name = message_type.clone();
        let invoke = move |payload: Payload| -> BoxFuture<'static, Result<Outcome, DispatchError>> {
            match serde_json::from_value::<C>(Value::Object(payload)) {
                Ok(command) => {
                    let name = name.clone();
                    handler(command)
                        .map(move |result| {
                            result.map_err(|e| DispatchError::HandlerFault {
                                message_type: name,
                                reason: e.0,
                            })
                        })
                        .boxed()
                }
                Err(e) => future::ready(Err(DispatchError::Decode {
                    message_type: name.clone(),
                    reason: e.to_string(),
                }))
                .boxed(),
            }
        };
        Self {
            message_type,
            invoke: Arc::new(invoke),
        }
    }

    /// Register a closure for a typed tool command under its own message type.
    pub fn tool<C, F, Fut>(handler: F) -> Self
    where
        C: ToolCommand,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome, HandlerError>> + Send + 'static,
    {
        Self::new::<C, F, Fut>(C::MESSAGE_TYPE, handler)
    }

    /// Register a [`CommandHandler`] object.
    pub fn handler<H: CommandHandler>(message_type: impl Into<String>, handler: Arc<H>) -> Self {
        Self::new(message_type, move |command: H::Command| {
            let handler = Arc::clone(&handler);
            async move { handler.handle(command).await }
        })
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

/// The dispatch table.
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    entries: HashMap<String, DispatchEntry>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a declarative list. Fails on the first duplicate type.
    pub fn from_entries(
        entries: impl IntoIterator<Item = DispatchEntry>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for entry in entries {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Add an entry. Duplicate types are a startup bug.
    pub fn register(&mut self, entry: DispatchEntry) -> Result<(), RegistryError> {
        if self.entries.contains_key(&entry.message_type) {
            return Err(RegistryError::DuplicateType(entry.message_type));
        }
        self.entries.insert(entry.message_type.clone(), entry);
        Ok(())
    }

    pub fn contains(&self, message_type: &str) -> bool {
        self.entries.contains_key(message_type)
    }

    /// Registered types, sorted.
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the handler for `message_type`. Panics become `HandlerFault`.
    pub async fn execute(
        &self,
        message_type: &str,
        payload: Payload,
    ) -> Result<Outcome, DispatchError> {
        let entry = self
            .entries
            .get(message_type)
            .ok_or_else(|| DispatchError::UnknownType(message_type.to_owned()))?;

        let panicked = || DispatchError::HandlerFault {
            message_type: message_type.to_owned(),
            reason: "handler panicked".to_owned(),
        };

        let invoke = Arc::clone(&entry.invoke);
        let pending = std::panic::catch_unwind(AssertUnwindSafe(move || invoke(payload)))
            .map_err(|_| panicked())?;
        AssertUnwindSafe(pending)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(panicked()))
    }

    /// [`dispatch`](Self::dispatch) a command that arrived on `origin`.
    pub async fn dispatch_from(&self, origin: ConnectionId, request: Envelope) -> Envelope {
        ORIGIN.scope(origin, self.dispatch(request)).await
    }

    /// Handle one inbound command and build its reply.
    ///
    /// Success replies use the request's own type; failures use `"error"`.
    /// Either way the reply carries the request's id.
    pub async fn dispatch(&self, request: Envelope) -> Envelope {
        let Envelope {
            message_type,
            id,
            data,
        } = request;

        match self.execute(&message_type, data).await {
            Ok(outcome) => {
                debug!(
                    correlation_id = %id,
                    message_type = %message_type,
                    success = outcome.success,
                    "Dispatched command"
                );
                Envelope::new(message_type, outcome.into_payload()).with_id(id)
            }
            Err(error) => {
                warn!(
                    correlation_id = %id,
                    message_type = %message_type,
                    error = %error,
                    "Command failed"
                );
                Envelope::error(error.to_string()).with_id(id)
            }
        }
    }
}
