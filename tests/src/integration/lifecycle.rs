//! # Server Lifecycle
//!
//! `Stopped → Starting → Listening → Draining → Stopped`, and what each
//! transition guarantees to peers and to waiting callers.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use bridge_engine::{
        BridgeServer, DispatchRegistry, EngineConfig, RequestError, ServerError, ServerState,
    };
    use bridge_types::Envelope;
    use tokio::net::TcpListener;

    use crate::support::{loopback_config, start_server, wait_for_connections, wait_until, RawPeer};

    #[tokio::test]
    async fn test_stop_cancels_waiters_and_releases_port() {
        let (server, addr) = start_server(DispatchRegistry::new()).await;
        let mut peer = RawPeer::connect(addr).await.unwrap();
        assert!(wait_for_connections(server.endpoint(), 1).await);

        let calls: Vec<_> = (0..3)
            .map(|n| {
                let endpoint = server.endpoint().clone();
                tokio::spawn(async move {
                    endpoint
                        .send_and_wait(
                            Envelope::empty("slow").with_id(format!("w{n}")),
                            Some(Duration::from_secs(30)),
                        )
                        .await
                })
            })
            .collect();
        for _ in 0..3 {
            assert!(peer.recv().await.is_some());
        }
        let endpoint = server.endpoint().clone();
        assert!(wait_until(|| endpoint.pending_count() == 3).await);

        let started = Instant::now();
        server.stop().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());

        for call in calls {
            let result = call.await.unwrap();
            assert!(matches!(result, Err(RequestError::Cancelled { .. })), "{result:?}");
        }
        assert_eq!(server.endpoint().pending_count(), 0);
        assert!(server.endpoint().connections().is_empty());
        assert!(peer.closed().await);

        // The port is free again.
        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_bind_on_same_port_fails() {
        let (first, addr) = start_server(DispatchRegistry::new()).await;

        let mut config = loopback_config(EngineConfig::default());
        config.port = addr.port();
        let second = BridgeServer::new(config, Arc::new(DispatchRegistry::new())).unwrap();
        let result = second.start().await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert_eq!(second.state(), ServerState::Stopped);

        first.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (server, _addr) = start_server(DispatchRegistry::new()).await;
        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyRunning(ServerState::Listening))
        ));
        server.stop().await;
        server.stop().await;

        let addr = server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Listening);
        let _peer = RawPeer::connect(addr).await.unwrap();
        assert!(wait_for_connections(server.endpoint(), 1).await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_requests_after_stop_fail_fast() {
        let (server, addr) = start_server(DispatchRegistry::new()).await;
        let _peer = RawPeer::connect(addr).await.unwrap();
        assert!(wait_for_connections(server.endpoint(), 1).await);
        server.stop().await;

        let result = server
            .endpoint()
            .send_and_wait(Envelope::empty("ping"), None)
            .await;
        assert!(matches!(result, Err(RequestError::NoPeer)));
    }
}
