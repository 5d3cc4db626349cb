//! Typed tool commands.
//!
//! Each command maps one wire message type to a serde struct. Field names
//! are camelCase on the wire and unset optional fields are omitted.
//! What the editor does with a command is up to the editor.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::envelope::{Envelope, Payload};
use crate::outcome::DEFAULT_SUCCESS_MESSAGE;

/// Timeout for quick editor queries.
pub const SHORT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for operations that touch scenes, assets or scripts.
pub const LONG_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

/// A command that can travel as an envelope payload.
pub trait ToolCommand: Serialize + DeserializeOwned + Send + 'static {
    /// Wire discriminator, used for both the request and its reply.
    const MESSAGE_TYPE: &'static str;

    /// How long a caller waits for the editor to answer.
    const TIMEOUT: Duration;

    /// Message reported when a successful reply carries none.
    const SUCCESS_MESSAGE: &'static str = DEFAULT_SUCCESS_MESSAGE;

    /// Rewrite the `data` of a successful reply before it reaches the caller.
    fn normalize_reply_data(_data: &mut Value) {}

    /// Serialize into a payload map.
    fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "{} must serialize to an object, got {other}",
                Self::MESSAGE_TYPE
            ))),
        }
    }

    /// Build a request envelope (without a correlation id).
    fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope::new(Self::MESSAGE_TYPE, self.to_payload()?))
    }
}

fn default_true() -> bool {
    true
}

fn default_get() -> String {
    "get".to_owned()
}

fn default_execute() -> String {
    "execute".to_owned()
}

fn default_console_types() -> Vec<String> {
    vec!["error".to_owned(), "warning".to_owned(), "log".to_owned()]
}

fn default_detailed() -> String {
    "detailed".to_owned()
}

/// Read or clear the editor console.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadConsole {
    /// `get` or `clear`.
    #[serde(default = "default_get")]
    pub action: String,
    /// Message kinds: `error`, `warning`, `log`, `all`.
    #[serde(default = "default_console_types")]
    pub types: Vec<String>,
    pub count: Option<u32>,
    pub filter_text: Option<String>,
    /// ISO 8601 lower bound.
    pub since_timestamp: Option<String>,
    /// `plain`, `detailed` or `json`.
    #[serde(default = "default_detailed")]
    pub format: String,
    #[serde(default = "default_true")]
    pub include_stacktrace: bool,
}

impl Default for ReadConsole {
    fn default() -> Self {
        Self {
            action: default_get(),
            types: default_console_types(),
            count: None,
            filter_text: None,
            since_timestamp: None,
            format: default_detailed(),
            include_stacktrace: true,
        }
    }
}

impl ToolCommand for ReadConsole {
    const MESSAGE_TYPE: &'static str = "read_console";
    const TIMEOUT: Duration = SHORT_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "Console messages retrieved successfully";
}

/// Execute an editor menu item by path.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteMenuItem {
    #[serde(default = "default_execute")]
    pub action: String,
    pub menu_path: Option<String>,
    #[serde(default)]
    pub parameters: Payload,
}

impl Default for ExecuteMenuItem {
    fn default() -> Self {
        Self {
            action: default_execute(),
            menu_path: None,
            parameters: Payload::new(),
        }
    }
}

impl ToolCommand for ExecuteMenuItem {
    const MESSAGE_TYPE: &'static str = "execute_menu_item";
    const TIMEOUT: Duration = SHORT_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "Menu item executed successfully";
}

/// Create, modify, find or delete scene objects.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageGameObject {
    pub action: String,
    pub target: Option<String>,
    pub search_method: Option<String>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub parent: Option<String>,
    pub position: Option<Vec<f32>>,
    pub rotation: Option<Vec<f32>>,
    pub scale: Option<Vec<f32>>,
    pub components_to_add: Option<Vec<String>>,
    pub primitive_type: Option<String>,
    #[serde(default)]
    pub save_as_prefab: bool,
    pub prefab_path: Option<String>,
    pub set_active: Option<bool>,
    pub layer: Option<String>,
    pub components_to_remove: Option<Vec<String>>,
    /// Component name → property name → value.
    pub component_properties: Option<Payload>,
    pub search_term: Option<String>,
    #[serde(default)]
    pub find_all: bool,
    #[serde(default)]
    pub search_in_children: bool,
    #[serde(default)]
    pub search_inactive: bool,
    pub component_name: Option<String>,
}

impl ToolCommand for ManageGameObject {
    const MESSAGE_TYPE: &'static str = "manage_gameobject";
    const TIMEOUT: Duration = LONG_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "GameObject operation successful.";
}

/// Load, save, create scenes or read their hierarchy.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageScene {
    pub action: String,
    pub name: Option<String>,
    pub path: Option<String>,
    pub build_index: Option<i32>,
}

impl ToolCommand for ManageScene {
    const MESSAGE_TYPE: &'static str = "manage_scene";
    const TIMEOUT: Duration = LONG_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "Scene operation successful.";
}

/// Create, read, update or delete scripts.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageScript {
    pub action: String,
    pub name: Option<String>,
    pub path: Option<String>,
    pub contents: Option<String>,
    pub script_type: Option<String>,
    pub namespace: Option<String>,
    pub encoded_contents: Option<String>,
    pub contents_encoded: Option<bool>,
}

impl ManageScript {
    /// Attach script source. `create` and `update` send it base64-encoded so
    /// that arbitrary source text survives the editor's JSON handling.
    #[must_use]
    pub fn with_contents(mut self, contents: &str) -> Self {
        if self.action == "create" || self.action == "update" {
            self.encoded_contents = Some(STANDARD.encode(contents.as_bytes()));
            self.contents_encoded = Some(true);
            self.contents = None;
        } else {
            self.contents = Some(contents.to_owned());
        }
        self
    }
}

impl ToolCommand for ManageScript {
    const MESSAGE_TYPE: &'static str = "manage_script";
    const TIMEOUT: Duration = LONG_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "Operation successful.";

    /// Replies may carry the script source base64-encoded; hand it back as text.
    fn normalize_reply_data(data: &mut Value) {
        let Some(map) = data.as_object_mut() else {
            return;
        };
        if map.get("contentsEncoded").and_then(Value::as_bool) != Some(true) {
            return;
        }
        let decoded = map
            .get("encodedContents")
            .and_then(Value::as_str)
            .and_then(|encoded| STANDARD.decode(encoded).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok());
        if let Some(contents) = decoded {
            map.insert("contents".to_owned(), Value::String(contents));
            map.remove("encodedContents");
            map.remove("contentsEncoded");
        }
    }
}

/// Import, create, move, search assets.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageAsset {
    pub action: String,
    pub path: String,
    pub asset_type: Option<String>,
    #[serde(default)]
    pub properties: Payload,
    pub destination: Option<String>,
    #[serde(default)]
    pub generate_preview: bool,
    pub search_pattern: Option<String>,
    pub filter_type: Option<String>,
    pub filter_date_after: Option<String>,
    pub page_size: Option<u32>,
    pub page_number: Option<u32>,
}

impl ToolCommand for ManageAsset {
    const MESSAGE_TYPE: &'static str = "manage_asset";
    const TIMEOUT: Duration = LONG_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "Asset operation completed successfully";
}

/// Editor state: play mode, active tool, tags, layers.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManageEditor {
    pub action: String,
    pub wait_for_completion: Option<bool>,
    pub tool_name: Option<String>,
    pub tag_name: Option<String>,
    pub layer_name: Option<String>,
}

impl ToolCommand for ManageEditor {
    const MESSAGE_TYPE: &'static str = "manage_editor";
    const TIMEOUT: Duration = SHORT_TOOL_TIMEOUT;
    const SUCCESS_MESSAGE: &'static str = "Editor operation successful.";
}
