//! Cross-process notification bridge for sandpit.
//!
//! The renderer side keeps one fire-and-forget [`Channel`] per
//! (browser, frame) pair and routes query traffic for the script contexts
//! living in it. The controller side dispatches those queries to registered
//! [`QueryHandler`]s and surfaces focus notifications as
//! [`ControllerEvent`]s.
//!
//! # Module layout
//!
//! - [`protocol`] - ids, keys, [`ProcessMessage`] and [`Envelope`]
//! - [`channel`] - per-frame channels and in-process duplex links
//! - [`renderer`] - [`RendererRouter`], context lifecycle and pending queries
//! - [`controller`] - [`ControllerRouter`], handlers and callbacks
//! - [`transport`] - JSON-lines encoding over async byte streams

pub mod channel;
pub mod controller;
pub mod protocol;
pub mod renderer;
pub mod transport;

pub use channel::{Channel, EnvelopeReceiver, EnvelopeSender, LinkEnd, ProcessLink};
pub use controller::{ControllerEvent, ControllerRouter, QueryCallback, QueryHandler};
pub use protocol::{
    BrowserId, ChannelKey, ContextId, ContextKey, Envelope, FOCUSED_NODE_CHANGED_MESSAGE, FrameId,
    ProcessId, ProcessMessage, UNHANDLED_QUERY_CODE, UNHANDLED_QUERY_MESSAGE,
};
pub use renderer::{QueryError, QueryResult, QueryResultCallback, RendererRouter};
pub use transport::{BridgeError, decode_envelope, encode_envelope, read_envelopes, write_envelopes};
