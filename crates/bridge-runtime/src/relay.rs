//! Tool relay: forwards typed tool commands to the connected editor and
//! turns whatever comes back into a structured [`Outcome`].
//!
//! Reply classification:
//! - `"error"` → failure carrying the editor's message
//! - the tool's own type → success carrying the editor's message and data
//! - anything else → failure, unexpected reply type
//! - no reply in time → failure, timeout

use bridge_engine::{Endpoint, RequestError};
use bridge_types::{
    Envelope, ExecuteMenuItem, ManageAsset, ManageEditor, ManageGameObject, ManageScene,
    ManageScript, Outcome, Payload, ReadConsole, ToolCommand,
};
use serde_json::Value;
use tracing::{debug, warn};

pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";
pub const UNEXPECTED_REPLY_MESSAGE: &str = "Unexpected response type from editor";
pub const TIMEOUT_MESSAGE: &str = "Timeout waiting for editor response";
pub const NO_EDITOR_MESSAGE: &str = "No editor connected";

/// Every tool type the relay knows.
pub const TOOL_TYPES: [&str; 7] = [
    ReadConsole::MESSAGE_TYPE,
    ExecuteMenuItem::MESSAGE_TYPE,
    ManageGameObject::MESSAGE_TYPE,
    ManageScene::MESSAGE_TYPE,
    ManageScript::MESSAGE_TYPE,
    ManageAsset::MESSAGE_TYPE,
    ManageEditor::MESSAGE_TYPE,
];

#[derive(Clone)]
pub struct ToolRelay {
    endpoint: Endpoint,
}

impl ToolRelay {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// Send a typed command and wait for the editor, bounded by the tool's
    /// own timeout.
    pub async fn call<C: ToolCommand>(&self, command: &C) -> Outcome {
        let envelope = match command.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                return Outcome::failure(format!("Failed to encode {}: {e}", C::MESSAGE_TYPE))
            }
        };

        match self.endpoint.send_and_wait(envelope, Some(C::TIMEOUT)).await {
            Ok(reply) => classify::<C>(reply),
            Err(error) => {
                warn!(tool = C::MESSAGE_TYPE, error = %error, "Tool call failed");
                match error {
                    RequestError::Timeout { .. } => Outcome::failure(TIMEOUT_MESSAGE),
                    RequestError::NoPeer => Outcome::failure(NO_EDITOR_MESSAGE),
                    other => Outcome::from(other),
                }
            }
        }
    }

    /// Call a tool by its type name with untyped arguments, as an agent
    /// would. Arguments are validated against the tool's command shape
    /// before anything is sent.
    pub async fn invoke(&self, tool: &str, arguments: Payload) -> Outcome {
        debug!(tool = tool, "Invoking tool");
        match tool {
            ReadConsole::MESSAGE_TYPE => self.invoke_as::<ReadConsole>(arguments).await,
            ExecuteMenuItem::MESSAGE_TYPE => self.invoke_as::<ExecuteMenuItem>(arguments).await,
            ManageGameObject::MESSAGE_TYPE => self.invoke_as::<ManageGameObject>(arguments).await,
            ManageScene::MESSAGE_TYPE => self.invoke_as::<ManageScene>(arguments).await,
            ManageAsset::MESSAGE_TYPE => self.invoke_as::<ManageAsset>(arguments).await,
            ManageEditor::MESSAGE_TYPE => self.invoke_as::<ManageEditor>(arguments).await,
            ManageScript::MESSAGE_TYPE => match decode::<ManageScript>(arguments) {
                Ok(mut command) => {
                    if let Some(contents) = command.contents.take() {
                        command = command.with_contents(&contents);
                    }
                    self.call(&command).await
                }
                Err(outcome) => outcome,
            },
            other => Outcome::failure(format!("Unknown tool: {other}")),
        }
    }

    async fn invoke_as<C: ToolCommand>(&self, arguments: Payload) -> Outcome {
        match decode::<C>(arguments) {
            Ok(command) => self.call(&command).await,
            Err(outcome) => outcome,
        }
    }

    pub async fn read_console(&self, command: ReadConsole) -> Outcome {
        self.call(&command).await
    }

    pub async fn execute_menu_item(&self, command: ExecuteMenuItem) -> Outcome {
        self.call(&command).await
    }

    pub async fn manage_gameobject(&self, command: ManageGameObject) -> Outcome {
        self.call(&command).await
    }

    pub async fn manage_scene(&self, command: ManageScene) -> Outcome {
        self.call(&command).await
    }

    pub async fn manage_script(&self, command: ManageScript) -> Outcome {
        self.call(&command).await
    }

    pub async fn manage_asset(&self, command: ManageAsset) -> Outcome {
        self.call(&command).await
    }

    pub async fn manage_editor(&self, command: ManageEditor) -> Outcome {
        self.call(&command).await
    }
}

fn decode<C: ToolCommand>(arguments: Payload) -> Result<C, Outcome> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| {
        Outcome::failure(format!("Invalid arguments for {}: {e}", C::MESSAGE_TYPE))
    })
}

/// Classify an editor reply to a `C` command.
pub fn classify<C: ToolCommand>(reply: Envelope) -> Outcome {
    let message = reply
        .data
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned);

    if reply.is_error() {
        return Outcome::failure(message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_owned()));
    }
    if reply.message_type != C::MESSAGE_TYPE {
        warn!(
            tool = C::MESSAGE_TYPE,
            reply_type = %reply.message_type,
            "Unexpected reply type"
        );
        return Outcome::failure(UNEXPECTED_REPLY_MESSAGE);
    }

    let mut data = reply.data.get("data").filter(|v| !v.is_null()).cloned();
    if let Some(data) = data.as_mut() {
        C::normalize_reply_data(data);
    }
    Outcome {
        success: true,
        message: message.unwrap_or_else(|| C::SUCCESS_MESSAGE.to_owned()),
        data,
    }
}
