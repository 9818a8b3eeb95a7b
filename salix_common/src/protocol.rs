//! Wire envelopes.
//!
//! Every frame is one JSON message. Inbound frames carrying a `command`
//! field are requests; frames carrying a `request_id` together with
//! `result` or `error` are replies to an earlier `invoke_func`. Responses
//! answer requests with `{status: "ok"|"error", ...}`.

use salix_core::{InvokeError, Outcome, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conventional listen port.
pub const DEFAULT_PORT: u16 = 8765;

/// Declarative node structure, as carried by `create_tree`/`update_tree`
/// and returned by `get_tree`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum NodeSpec {
    #[serde(rename = "ActionNode")]
    Action {
        action: String,
        #[serde(default)]
        repeat: bool,
        #[serde(default = "default_repeat_count")]
        repeat_count: u32,
        #[serde(default)]
        execute_once: bool,
    },
    #[serde(rename = "ConditionNode")]
    Condition { condition: String },
    #[serde(rename = "SequenceNode")]
    Sequence { children: Vec<NodeSpec> },
    #[serde(rename = "SelectorNode")]
    Selector { children: Vec<NodeSpec> },
    #[serde(rename = "ParallelNode")]
    Parallel {
        children: Vec<NodeSpec>,
        success_threshold: usize,
    },
    #[serde(rename = "InvertDecorator")]
    Invert { child: Box<NodeSpec> },
    #[serde(rename = "RepeatDecorator")]
    Repeat { child: Box<NodeSpec>, count: u32 },
    #[serde(rename = "TimeoutDecorator")]
    Timeout { child: Box<NodeSpec>, timeout_ms: u64 },
    #[serde(rename = "RepeatUntilSuccessDecorator")]
    RepeatUntilSuccess { child: Box<NodeSpec>, max_retries: u32 },
}

fn default_repeat_count() -> u32 {
    1
}

/// Commands accepted over the wire.
///
/// `invoke_func` is special: with a `request_id` it is the frame the
/// coordinator sends to the owning worker; without one it is a direct
/// client invocation routed through the registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    RegisterAction {
        name: String,
    },
    RegisterCondition {
        name: String,
    },
    CreateTree {
        tree_id: String,
        tree_structure: NodeSpec,
    },
    UpdateTree {
        tree_id: String,
        tree_structure: NodeSpec,
    },
    DeleteTree {
        tree_id: String,
    },
    DeleteAllTree,
    RunTree {
        tree_id: String,
    },
    StopTree {
        tree_id: String,
    },
    GetActions,
    GetConditions,
    GetTree {
        tree_id: String,
    },
    InvokeFunc {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },
}

const KNOWN_COMMANDS: &[&str] = &[
    "register_action",
    "register_condition",
    "create_tree",
    "update_tree",
    "delete_tree",
    "delete_all_tree",
    "run_tree",
    "stop_tree",
    "get_actions",
    "get_conditions",
    "get_tree",
    "invoke_func",
];

/// A worker's answer to an `invoke_func` frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InvokeReply {
    pub request_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvokeReply {
    pub fn ok(request_id: u64, result: bool) -> Self {
        InvokeReply {
            request_id,
            result: Some(result),
            error: None,
        }
    }
    pub fn err(request_id: u64, error: impl Into<String>) -> Self {
        InvokeReply {
            request_id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<bool, InvokeError> {
        match (self.result, self.error) {
            (Some(v), _) => Ok(v),
            (None, Some(e)) => Err(InvokeError::Remote(e)),
            (None, None) => Err(InvokeError::Remote("malformed reply".to_string())),
        }
    }
}

/// Machine-readable error tag carried next to the human message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SchemaError,
    UnknownCommand,
    UnknownLeaf,
    DuplicateLeaf,
    UnknownTree,
    DuplicateTree,
    TreeBusy,
    LeafUnavailable,
    RemoteError,
    Timeout,
    Cancelled,
    InternalError,
}

/// Errors surfaced to the requesting peer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Schema(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown leaf '{0}'")]
    UnknownLeaf(String),
    #[error("leaf '{0}' is already registered")]
    DuplicateLeaf(String),
    #[error("tree '{0}' not found")]
    UnknownTree(String),
    #[error("tree '{0}' already exists")]
    DuplicateTree(String),
    #[error("tree '{0}' is already running")]
    TreeBusy(String),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("internal fault: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Schema(_) => ErrorCode::SchemaError,
            ApiError::UnknownCommand(_) => ErrorCode::UnknownCommand,
            ApiError::UnknownLeaf(_) => ErrorCode::UnknownLeaf,
            ApiError::DuplicateLeaf(_) => ErrorCode::DuplicateLeaf,
            ApiError::UnknownTree(_) => ErrorCode::UnknownTree,
            ApiError::DuplicateTree(_) => ErrorCode::DuplicateTree,
            ApiError::TreeBusy(_) => ErrorCode::TreeBusy,
            ApiError::Invoke(InvokeError::LeafUnavailable(_)) => ErrorCode::LeafUnavailable,
            ApiError::Invoke(InvokeError::Remote(_)) => ErrorCode::RemoteError,
            ApiError::Invoke(InvokeError::Timeout) => ErrorCode::Timeout,
            ApiError::Invoke(InvokeError::Cancelled) => ErrorCode::Cancelled,
            ApiError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// A context entry flattened for the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContextEntryView {
    pub leaf: String,
    pub status: Status,
    pub timestamp_ms: u64,
}

impl From<&salix_core::ContextEntry> for ContextEntryView {
    fn from(entry: &salix_core::ContextEntry) -> Self {
        let timestamp_ms = entry
            .timestamp
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        ContextEntryView {
            leaf: entry.leaf.clone(),
            status: entry.status,
            timestamp_ms,
        }
    }
}

/// `get_tree` payload: the declarative structure plus the evaluation log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TreeDescription {
    pub root: NodeSpec,
    #[serde(default)]
    pub context: Vec<ContextEntryView>,
}

/// Response envelope; payload fields are filled per command.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<TreeDescription>,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            status: ResponseStatus::Ok,
            message: None,
            code: None,
            actions: None,
            conditions: None,
            result: None,
            tree: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions = Some(actions);
        self
    }
    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = Some(conditions);
        self
    }
    pub fn with_result(mut self, result: Outcome) -> Self {
        self.result = Some(result);
        self
    }
    pub fn with_tree(mut self, tree: TreeDescription) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

impl From<&ApiError> for Response {
    fn from(err: &ApiError) -> Self {
        Response {
            status: ResponseStatus::Error,
            message: Some(err.to_string()),
            code: Some(err.code()),
            actions: None,
            conditions: None,
            result: None,
            tree: None,
        }
    }
}

/// A frame as the coordinator sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(Request),
    Reply(InvokeReply),
}

/// A frame as a worker or client sees it.
#[derive(Debug, Clone)]
pub enum PeerFrame {
    Request(Request),
    Response(Response),
}

/// Demultiplex one inbound coordinator frame.
pub fn parse_frame(text: &str) -> Result<Frame, ApiError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ApiError::Schema(format!("invalid JSON: {e}")))?;
    if let Some(command) = value.get("command") {
        let command = command
            .as_str()
            .ok_or_else(|| ApiError::Schema("command must be a string".to_string()))?
            .to_string();
        if !KNOWN_COMMANDS.contains(&command.as_str()) {
            return Err(ApiError::UnknownCommand(command));
        }
        serde_json::from_value::<Request>(value)
            .map(Frame::Request)
            .map_err(|e| ApiError::Schema(format!("malformed '{command}' request: {e}")))
    } else if value.get("request_id").is_some() {
        serde_json::from_value::<InvokeReply>(value)
            .map(Frame::Reply)
            .map_err(|e| ApiError::Schema(format!("malformed invocation reply: {e}")))
    } else {
        Err(ApiError::Schema(
            "frame is neither a command nor an invocation reply".to_string(),
        ))
    }
}

/// Demultiplex one frame received from the coordinator.
pub fn parse_peer_frame(text: &str) -> Result<PeerFrame, ApiError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ApiError::Schema(format!("invalid JSON: {e}")))?;
    if value.get("command").is_some() {
        serde_json::from_value::<Request>(value)
            .map(PeerFrame::Request)
            .map_err(|e| ApiError::Schema(format!("malformed request: {e}")))
    } else if value.get("status").is_some() {
        serde_json::from_value::<Response>(value)
            .map(PeerFrame::Response)
            .map_err(|e| ApiError::Schema(format!("malformed response: {e}")))
    } else {
        Err(ApiError::Schema(
            "frame is neither a command nor a response".to_string(),
        ))
    }
}
