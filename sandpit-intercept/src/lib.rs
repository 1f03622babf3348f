//! Trap interception for privileged host objects exposed to script.
//!
//! A host object is wrapped in a transparent proxy whose traps report every
//! read, membership test, enumeration and call to a native handler, which
//! serializes it into a [`TrapRecord`] and appends it to a [`TrapSink`].
//!
//! # Module layout
//!
//! - [`value`] - script values and the [`ScriptObject`] interface
//! - [`trap`] - [`TrapKind`] and [`TrapRecord`] with its log line format
//! - [`sink`] - file and in-memory sinks
//! - [`handler`] - the native intercept handler
//! - [`proxy`] - the interception wrapper
//! - [`installer`] - per-context installation (native or generated script)

pub mod handler;
pub mod installer;
pub mod proxy;
pub mod sink;
pub mod trap;
pub mod value;

pub use handler::InterceptHandler;
pub use installer::{Installation, ProxyInstaller, ScriptContext, ScriptFrame};
pub use proxy::InterceptProxy;
pub use sink::{FileTrapSink, MemoryTrapSink, TrapSink};
pub use trap::{TrapKind, TrapRecord};
pub use value::{HostObject, NativeFn, ObjectRef, ScriptError, ScriptObject, ScriptValue};
