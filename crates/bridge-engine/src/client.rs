//! Connecting end of the bridge (the editor side).
//!
//! Runs the same engine as the listening end over a single outbound
//! connection: inbound commands are dispatched to the local registry, and
//! the editor can issue its own requests through [`BridgeClient::endpoint`].

use std::sync::Arc;

use bridge_types::{Envelope, Payload, CONNECTION_TYPE, DISCONNECT_TYPE};
use serde_json::Value;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::dispatch::DispatchRegistry;
use crate::domain::{ClientConfig, ConnectError};
use crate::endpoint::Endpoint;
use crate::transport::ConnectionId;

pub struct BridgeClient {
    endpoint: Endpoint,
    connection: ConnectionId,
    config: ClientConfig,
}

impl BridgeClient {
    /// Connect, start the session loop and announce ourselves.
    ///
    /// The `connection` handshake is sent as a request; a peer that does not
    /// answer it in time is logged but the connection is kept.
    pub async fn connect<A>(
        addr: A,
        dispatch: Arc<DispatchRegistry>,
        config: ClientConfig,
    ) -> Result<Self, ConnectError>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        config.engine.validate()?;

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ConnectError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(error) = stream.set_nodelay(true) {
            warn!(error = %error, "Failed to set TCP_NODELAY");
        }

        let endpoint = Endpoint::new(config.engine.clone(), dispatch);
        let connection = endpoint.attach(stream, addr.to_string());
        info!(connection_id = %connection, addr = %addr, "Connected to bridge server");

        let client = Self {
            endpoint,
            connection,
            config,
        };
        if client.config.handshake {
            client.handshake().await;
        }
        Ok(client)
    }

    async fn handshake(&self) {
        let mut data = Payload::new();
        data.insert(
            "client".to_owned(),
            Value::String(self.config.client_name.clone()),
        );
        data.insert(
            "version".to_owned(),
            Value::String(self.config.client_version.clone()),
        );

        match self
            .endpoint
            .request(self.connection, Envelope::new(CONNECTION_TYPE, data), None)
            .await
        {
            Ok(reply) => debug!(
                message_type = %reply.message_type,
                message = %reply.outcome().message,
                "Handshake acknowledged"
            ),
            Err(error) => warn!(error = %error, "Handshake not acknowledged"),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection
    }

    /// True while the server side is still connected.
    pub fn is_connected(&self) -> bool {
        self.endpoint.connection_registry().contains(self.connection)
    }

    /// Announce the disconnect, then close the stream and stop the session.
    pub async fn close(self) {
        if self.config.handshake && self.is_connected() {
            let mut data = Payload::new();
            data.insert(
                "client".to_owned(),
                Value::String(self.config.client_name.clone()),
            );
            let goodbye = Envelope::new(DISCONNECT_TYPE, data);
            if let Err(error) = self.endpoint.send_to(self.connection, &goodbye).await {
                debug!(error = %error, "Disconnect notice not delivered");
            }
        }
        self.endpoint.shutdown().await;
        info!(connection_id = %self.connection, "Disconnected from bridge server");
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        // Wakes the session loop so the socket is released without `close`.
        self.endpoint.begin_shutdown();
    }
}
