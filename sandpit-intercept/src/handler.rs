//! The native side of interception.
//!
//! [`InterceptHandler`] turns trap reports into [`TrapRecord`]s and appends
//! them to the sink. It is reachable two ways: directly from
//! [`crate::proxy::InterceptProxy`], and from script through the native
//! callable built by [`InterceptHandler::native_function`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::sink::TrapSink;
use crate::trap::{TrapKind, TrapRecord};
use crate::value::{NativeFn, ScriptError, ScriptValue};

/// Records trap activity for one wrapped object in one script context.
///
/// Holds the sink weakly: once the owner drops the sink, or once the handler
/// is revoked at context teardown, every report becomes a no-op.
pub struct InterceptHandler {
    target: String,
    sink: Weak<dyn TrapSink>,
    active: AtomicBool,
}

impl InterceptHandler {
    pub fn new(target: impl Into<String>, sink: &Arc<dyn TrapSink>) -> Self {
        Self {
            target: target.into(),
            sink: Arc::downgrade(sink),
            active: AtomicBool::new(true),
        }
    }

    /// Global name of the object this handler reports on.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop recording. Later reports are dropped.
    pub fn revoke(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Append one record for `kind` with already-stringified arguments.
    pub fn report(&self, kind: TrapKind, args: Vec<String>) {
        if !self.is_active() {
            log::trace!("InterceptHandler[{}]: revoked, dropping {}", self.target, kind);
            return;
        }
        let Some(sink) = self.sink.upgrade() else {
            log::trace!("InterceptHandler[{}]: sink gone, dropping {}", self.target, kind);
            return;
        };
        sink.append(&TrapRecord::new(kind, self.target.clone(), args));
    }

    /// Entry point for the script-visible `intercept(name, ...args)` callable.
    ///
    /// The first argument names the trap; the rest are stringified lossily.
    /// Always returns `undefined` so the calling trap proceeds unchanged.
    pub fn execute(&self, args: &[ScriptValue]) -> ScriptValue {
        let Some((name, rest)) = args.split_first() else {
            log::debug!("InterceptHandler[{}]: called without a trap name", self.target);
            return ScriptValue::Undefined;
        };
        let label = name.to_log_string();
        match TrapKind::from_label(&label) {
            Some(kind) => {
                let args = rest.iter().map(ScriptValue::to_log_string).collect();
                self.report(kind, args);
            }
            None => {
                log::debug!(
                    "InterceptHandler[{}]: unknown trap name {:?}",
                    self.target,
                    label
                );
            }
        }
        ScriptValue::Undefined
    }

    /// Build the native callable registered into the script context.
    pub fn native_function(self: &Arc<Self>) -> NativeFn {
        let handler = Arc::clone(self);
        Arc::new(
            move |_this: &ScriptValue, args: &[ScriptValue]| -> Result<ScriptValue, ScriptError> {
                Ok(handler.execute(args))
            },
        )
    }
}
