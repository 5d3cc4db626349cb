//! # Framing Over Real Sockets
//!
//! TCP delivers bytes, not messages. These flows check that the session
//! loop reassembles split documents, separates coalesced ones, and closes
//! only the offending connection on malformed or oversized input.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bridge_engine::{DispatchEntry, DispatchRegistry, EngineConfig};
    use bridge_types::{Envelope, Outcome, Payload};
    use serde_json::{json, Value};

    use crate::support::{payload, start_server, start_server_with, RawPeer};

    fn echo_registry() -> DispatchRegistry {
        DispatchRegistry::from_entries([DispatchEntry::new("echo", |data: Payload| async move {
            Ok(Outcome::success("Echo").with_data(Value::Object(data)))
        })])
        .unwrap()
    }

    #[tokio::test]
    async fn test_document_split_across_writes() {
        let (server, addr) = start_server(echo_registry()).await;
        let mut peer = RawPeer::connect(addr).await.unwrap();

        let frame = br#"{"type":"echo","id":"split","data":{"text":"a {brace} and \"quote\""}}"#;
        for piece in frame.chunks(5) {
            peer.send_raw(piece).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        peer.send_raw(b"\n").await.unwrap();

        let reply = peer.recv().await.expect("one reply");
        assert_eq!(reply.id, "split");
        assert_eq!(
            reply.outcome().data,
            Some(json!({"text": "a {brace} and \"quote\""}))
        );
        assert!(peer.recv_nothing(Duration::from_millis(200)).await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_coalesced_documents_in_one_write() {
        let (server, addr) = start_server(echo_registry()).await;
        let mut peer = RawPeer::connect(addr).await.unwrap();

        peer.send_raw(
            b"{\"type\":\"echo\",\"id\":\"1\",\"data\":{}}\n{\"type\":\"echo\",\"id\":\"2\",\"data\":{}}{\"type\":\"echo\",\"id\":\"3\"}\n",
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(peer.recv().await.expect("reply").id);
        }
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_large_document_spans_many_reads() {
        let engine = EngineConfig {
            read_chunk_size: 512,
            ..EngineConfig::default()
        };
        let (server, addr) = start_server_with(echo_registry(), engine).await;
        let mut peer = RawPeer::connect(addr).await.unwrap();

        let blob = "x".repeat(200_000);
        peer.send(&Envelope::new("echo", payload(json!({"blob": blob}))).with_id("big"))
            .await
            .unwrap();

        let reply = peer.recv().await.expect("reply");
        assert_eq!(reply.id, "big");
        assert_eq!(reply.outcome().data, Some(json!({"blob": blob})));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_json_replies_then_closes_only_that_connection() {
        let (server, addr) = start_server(echo_registry()).await;
        let mut bad = RawPeer::connect(addr).await.unwrap();
        let mut good = RawPeer::connect(addr).await.unwrap();

        bad.send_raw(b"{not json}\n").await.unwrap();
        let reply = bad.recv().await.expect("error reply");
        assert!(reply.is_error());
        assert!(reply.outcome().message.starts_with("Invalid JSON format:"));
        assert!(bad.closed().await);

        good.send(&Envelope::empty("echo").with_id("still-here"))
            .await
            .unwrap();
        assert_eq!(good.recv().await.expect("reply").id, "still-here");

        // Still accepting.
        let mut fresh = RawPeer::connect(addr).await.unwrap();
        fresh.send(&Envelope::empty("echo").with_id("new")).await.unwrap();
        assert_eq!(fresh.recv().await.expect("reply").id, "new");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_document_closes_connection() {
        let engine = EngineConfig {
            max_frame_size: 1024,
            ..EngineConfig::default()
        };
        let (server, addr) = start_server_with(echo_registry(), engine).await;
        let mut peer = RawPeer::connect(addr).await.unwrap();

        let oversized = format!(r#"{{"type":"echo","data":{{"s":"{}"}}}}"#, "x".repeat(4096));
        peer.send_raw(oversized.as_bytes()).await.unwrap();
        assert!(peer.closed().await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_pascal_case_envelope_is_accepted() {
        let (server, addr) = start_server(echo_registry()).await;
        let mut peer = RawPeer::connect(addr).await.unwrap();

        peer.send_raw(b"{\"Type\":\"echo\",\"Id\":\"legacy\",\"Data\":{\"k\":1}}\n")
            .await
            .unwrap();
        let reply = peer.recv().await.expect("reply");
        assert_eq!(reply.message_type, "echo");
        assert_eq!(reply.id, "legacy");
        assert_eq!(reply.outcome().data, Some(json!({"k": 1})));

        server.stop().await;
    }
}
