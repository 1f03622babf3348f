//! Message types exchanged between the renderer and the controller.
//!
//! Every message travels inside an [`Envelope`] that names the browser and
//! frame it belongs to. On a process boundary envelopes are JSON objects, one
//! per line (see [`crate::transport`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Public name of the focus notification.
pub const FOCUSED_NODE_CHANGED_MESSAGE: &str = "ClientRenderer.FocusedNodeChanged";

/// Error code sent when no handler accepted a query.
pub const UNHANDLED_QUERY_CODE: i32 = -1;
/// Error message sent when no handler accepted a query.
pub const UNHANDLED_QUERY_MESSAGE: &str = "Unhandled request";

/// Identity of a browser (tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrowserId(pub u32);

/// Identity of a frame within a browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub i64);

/// Identity of a script context within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "browser#{}", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// The two ends of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessId {
    /// The controlling process.
    Browser,
    /// The process that hosts script contexts.
    Renderer,
}

/// Key of a per-(browser, frame) channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub browser: BrowserId,
    pub frame: FrameId,
}

/// Key of a single script context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub browser: BrowserId,
    pub frame: FrameId,
    pub context: ContextId,
}

impl ContextKey {
    pub fn new(browser: BrowserId, frame: FrameId, context: ContextId) -> Self {
        Self {
            browser,
            frame,
            context,
        }
    }

    pub fn channel(&self) -> ChannelKey {
        ChannelKey {
            browser: self.browser,
            frame: self.frame,
        }
    }
}

/// A message routed over the bridge.
///
/// Tagged with `type` for easy JSON dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessMessage {
    /// Renderer to controller: the focused node's editability changed.
    FocusedNodeChanged {
        /// Whether the newly focused node accepts text input.
        is_editable: bool,
    },

    /// Renderer to controller: a script issued a query.
    Query {
        /// Context the query was issued from.
        context: ContextId,
        /// Renderer-assigned id, unique within the context.
        request_id: u64,
        /// Opaque request payload.
        request: String,
        /// Persistent queries may receive many successes.
        persistent: bool,
    },

    /// Renderer to controller: the query is no longer wanted.
    QueryCancel { context: ContextId, request_id: u64 },

    /// Controller to renderer: a successful response.
    QuerySuccess {
        context: ContextId,
        request_id: u64,
        response: String,
    },

    /// Controller to renderer: the query failed. Always completes the query.
    QueryFailure {
        context: ContextId,
        request_id: u64,
        error_code: i32,
        error_message: String,
    },
}

impl ProcessMessage {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ProcessMessage::FocusedNodeChanged { .. } => FOCUSED_NODE_CHANGED_MESSAGE,
            ProcessMessage::Query { .. } => "MessageRouter.Query",
            ProcessMessage::QueryCancel { .. } => "MessageRouter.QueryCancel",
            ProcessMessage::QuerySuccess { .. } => "MessageRouter.QuerySuccess",
            ProcessMessage::QueryFailure { .. } => "MessageRouter.QueryFailure",
        }
    }
}

/// A [`ProcessMessage`] addressed to a (browser, frame) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub browser: BrowserId,
    pub frame: FrameId,
    pub message: ProcessMessage,
}

impl Envelope {
    pub fn new(key: ChannelKey, message: ProcessMessage) -> Self {
        Self {
            browser: key.browser,
            frame: key.frame,
            message,
        }
    }

    pub fn channel(&self) -> ChannelKey {
        ChannelKey {
            browser: self.browser,
            frame: self.frame,
        }
    }
}
