//! Collaborator interfaces the embedding engine implements.
//!
//! The engine owns frames, DOM nodes and script contexts; sandpit only sees
//! them through these traits while the matching lifecycle hook runs.

use sandpit_bridge::{ContextId, FrameId};
use sandpit_intercept::{ScriptContext, ScriptFrame};

/// A document frame inside a browser.
pub trait Frame: ScriptFrame {
    fn id(&self) -> FrameId;
}

/// The node that just received focus.
pub trait DomNode {
    /// Whether the node accepts text input.
    fn is_editable(&self) -> bool;
}

/// A script execution context, with its identity.
pub trait ScriptContextHost: ScriptContext {
    fn id(&self) -> ContextId;
}
