//! # Editor Session Flows
//!
//! The runtime on one end, an editor on the other:
//!
//! 1. **Handshake**: `connection` on connect, `disconnect` on close
//! 2. **Tool relay**: typed commands out, classified outcomes back
//! 3. **Reverse calls**: the editor issuing its own requests

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bridge_engine::{BridgeClient, ClientConfig, DispatchEntry, DispatchRegistry, HandlerError};
    use bridge_runtime::relay::{TIMEOUT_MESSAGE, UNEXPECTED_REPLY_MESSAGE};
    use bridge_runtime::{BridgeRuntime, RuntimeConfig};
    use bridge_types::{
        Envelope, ManageScene, ManageScript, Outcome, ReadConsole, ToolCommand,
    };
    use serde_json::json;

    use crate::support::{payload, wait_for_connections, wait_until, RawPeer};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    async fn start_runtime() -> (BridgeRuntime, SocketAddr) {
        let mut config = RuntimeConfig::default();
        config.server.port = 0;
        let runtime = BridgeRuntime::new(&config).unwrap();
        let addr = runtime.start().await.unwrap();
        (runtime, addr)
    }

    fn editor_config(name: &str) -> ClientConfig {
        ClientConfig {
            client_name: name.to_owned(),
            client_version: "2.1.0".to_owned(),
            ..ClientConfig::default()
        }
    }

    /// An editor that knows scenes and scripts.
    fn editor_registry() -> DispatchRegistry {
        DispatchRegistry::from_entries([
            DispatchEntry::tool(|scene: ManageScene| async move {
                match scene.name.as_deref() {
                    Some("Main") => Ok(Outcome::success("Loaded scene Main")
                        .with_data(json!({"name": "Main", "buildIndex": 0}))),
                    Some(other) => Err(HandlerError::new(format!("Scene '{other}' not found"))),
                    None => Err(HandlerError::new("'name' is required")),
                }
            }),
            DispatchEntry::tool(|script: ManageScript| async move {
                let decodes = script
                    .encoded_contents
                    .as_deref()
                    .is_some_and(|encoded| STANDARD.decode(encoded).is_ok());
                if script.contents.is_some() || !decodes {
                    return Err(HandlerError::new("expected base64 contents only"));
                }
                // Echo the encoded source back the way the editor reads it.
                Ok(Outcome::success("Script created").with_data(json!({
                    "path": script.path,
                    "encodedContents": script.encoded_contents,
                    "contentsEncoded": script.contents_encoded,
                })))
            }),
        ])
        .unwrap()
    }

    async fn connect_editor(addr: SocketAddr, name: &str) -> BridgeClient {
        BridgeClient::connect(addr, Arc::new(editor_registry()), editor_config(name))
            .await
            .unwrap()
    }

    // =============================================================================
    // HANDSHAKE
    // =============================================================================

    #[tokio::test]
    async fn test_handshake_registers_and_unregisters_editor() {
        let (runtime, addr) = start_runtime().await;

        let editor = connect_editor(addr, "UnityPlugin").await;
        assert!(editor.is_connected());
        assert_eq!(
            runtime.editors().clients(),
            vec![("UnityPlugin".to_owned(), "2.1.0".to_owned())]
        );

        editor.close().await;
        let editors = Arc::clone(runtime.editors());
        assert!(wait_until(|| editors.is_empty()).await);
        assert!(wait_for_connections(runtime.server().endpoint(), 0).await);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_socket_leaves_directory_without_goodbye() {
        let (runtime, addr) = start_runtime().await;
        let staying = connect_editor(addr, "UnityPlugin").await;

        // Same client name, announced by hand, then the socket just goes.
        let mut leaving = RawPeer::connect(addr).await.unwrap();
        leaving
            .send(
                &Envelope::new(
                    "connection",
                    payload(json!({"client": "UnityPlugin", "version": "2.0.0"})),
                )
                .with_id("hello"),
            )
            .await
            .unwrap();
        let reply = leaving.recv().await.expect("handshake reply");
        assert!(reply.outcome().success);
        assert_eq!(runtime.editors().len(), 2);

        drop(leaving);
        let editors = Arc::clone(runtime.editors());
        assert!(wait_until(|| editors.len() == 1).await);
        assert_eq!(
            editors.clients(),
            vec![("UnityPlugin".to_owned(), "2.1.0".to_owned())]
        );

        staying.close().await;
        assert!(wait_until(|| editors.is_empty()).await);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_client_without_handshake_stays_anonymous() {
        let (runtime, addr) = start_runtime().await;

        let config = ClientConfig {
            handshake: false,
            ..editor_config("Quiet")
        };
        let editor = BridgeClient::connect(addr, Arc::new(DispatchRegistry::new()), config)
            .await
            .unwrap();
        assert!(wait_for_connections(runtime.server().endpoint(), 1).await);
        assert!(runtime.editors().is_empty());

        editor.close().await;
        runtime.shutdown().await;
    }

    // =============================================================================
    // TOOL RELAY
    // =============================================================================

    #[tokio::test]
    async fn test_relay_success_carries_editor_message_and_data() {
        let (runtime, addr) = start_runtime().await;
        let editor = connect_editor(addr, "UnityPlugin").await;

        let outcome = runtime
            .relay()
            .manage_scene(ManageScene {
                action: "load".into(),
                name: Some("Main".into()),
                ..Default::default()
            })
            .await;
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.message, "Loaded scene Main");
        assert_eq!(outcome.data, Some(json!({"name": "Main", "buildIndex": 0})));
        assert_eq!(runtime.server().endpoint().pending_count(), 0);

        editor.close().await;
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_handler_error_becomes_failure() {
        let (runtime, addr) = start_runtime().await;
        let editor = connect_editor(addr, "UnityPlugin").await;

        let outcome = runtime
            .relay()
            .manage_scene(ManageScene {
                action: "load".into(),
                name: Some("Missing".into()),
                ..Default::default()
            })
            .await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.message,
            "Error processing message manage_scene: Scene 'Missing' not found"
        );

        // A tool the editor never registered.
        let outcome = runtime.relay().read_console(ReadConsole::default()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Unknown message type: read_console");

        editor.close().await;
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_script_contents_travel_encoded() {
        let (runtime, addr) = start_runtime().await;
        let editor = connect_editor(addr, "UnityPlugin").await;

        let source = "public class Player : MonoBehaviour {\n    // \"quoted\"\n}\n";
        let outcome = runtime
            .relay()
            .invoke(
                ManageScript::MESSAGE_TYPE,
                payload(json!({
                    "action": "create",
                    "name": "Player",
                    "path": "Assets/Scripts",
                    "contents": source,
                })),
            )
            .await;
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.message, "Script created");
        assert_eq!(
            outcome.data,
            Some(json!({"path": "Assets/Scripts", "contents": source}))
        );

        editor.close().await;
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_unexpected_reply_type() {
        let (runtime, addr) = start_runtime().await;
        let mut editor = RawPeer::connect(addr).await.unwrap();
        assert!(wait_for_connections(runtime.server().endpoint(), 1).await);

        let relay = runtime.relay().clone();
        let call = tokio::spawn(async move {
            relay
                .manage_scene(ManageScene {
                    action: "get_hierarchy".into(),
                    ..Default::default()
                })
                .await
        });

        let request = editor.recv().await.expect("request");
        assert_eq!(request.message_type, "manage_scene");
        assert_eq!(request.data["action"], "get_hierarchy");
        editor
            .send(&request.reply("response", Outcome::success("ok")))
            .await
            .unwrap();

        let outcome = call.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, UNEXPECTED_REPLY_MESSAGE);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_error_envelope_message_is_surfaced() {
        let (runtime, addr) = start_runtime().await;
        let mut editor = RawPeer::connect(addr).await.unwrap();
        assert!(wait_for_connections(runtime.server().endpoint(), 1).await);

        let relay = runtime.relay().clone();
        let call = tokio::spawn(async move {
            relay.invoke("manage_editor", payload(json!({"action": "play"}))).await
        });

        let request = editor.recv().await.expect("request");
        editor
            .send(&request.error_reply("Editor is compiling"))
            .await
            .unwrap();

        let outcome = call.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Editor is compiling");
        assert_ne!(outcome.message, TIMEOUT_MESSAGE);

        runtime.shutdown().await;
    }

    // =============================================================================
    // REVERSE CALLS
    // =============================================================================

    #[tokio::test]
    async fn test_editor_can_call_the_runtime() {
        let (runtime, addr) = start_runtime().await;
        let editor = connect_editor(addr, "UnityPlugin").await;

        let reply = editor
            .endpoint()
            .request(
                editor.connection_id(),
                Envelope::new("test", payload(json!({"message": "hello from the editor"}))),
                None,
            )
            .await
            .unwrap();
        assert_eq!(reply.message_type, "test");
        let outcome = reply.outcome();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Test message received successfully");

        editor.close().await;
        runtime.shutdown().await;
    }
}
