//! sandpit: records how script probes a privileged host object, and bridges
//! focus and query traffic between the renderer and its controller.
//!
//! The heavy lifting lives in the workspace crates:
//! `sandpit-intercept` (trap recording), `sandpit-bridge` (message routing)
//! and `sandpit-config`. This crate wires them into the lifecycle hooks an
//! embedding engine calls ([`renderer::RenderDelegate`]) and provides the
//! `sandpit` binary.

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod controller;
pub mod debug;
pub mod focus;
pub mod host;
pub mod renderer;

pub use focus::{FocusState, FocusTracker};
pub use host::{DomNode, Frame, ScriptContextHost};
pub use renderer::RenderDelegate;
