//! Transparent interception wrapper.

use std::sync::Arc;

use crate::handler::InterceptHandler;
use crate::trap::TrapKind;
use crate::value::{ObjectRef, ScriptError, ScriptObject, ScriptValue};

/// Wraps a host object, reporting reads, membership tests, enumeration and
/// calls to an [`InterceptHandler`] before delegating to the target.
///
/// Every return value is the target's own, untouched. Writes are forwarded
/// without a report.
pub struct InterceptProxy {
    target: ObjectRef,
    handler: Arc<InterceptHandler>,
}

impl InterceptProxy {
    pub fn new(target: ObjectRef, handler: Arc<InterceptHandler>) -> Self {
        Self { target, handler }
    }

    /// The unwrapped object.
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }
}

impl ScriptObject for InterceptProxy {
    fn get(&self, key: &str) -> ScriptValue {
        self.handler.report(TrapKind::Get, vec![key.to_string()]);
        self.target.get(key)
    }

    fn set(&self, key: &str, value: ScriptValue) -> bool {
        self.target.set(key, value)
    }

    fn has(&self, key: &str) -> bool {
        self.handler.report(TrapKind::Has, vec![key.to_string()]);
        self.target.has(key)
    }

    fn own_keys(&self) -> Vec<String> {
        let keys = self.target.own_keys();
        self.handler.report(TrapKind::OwnKeys, keys.clone());
        keys
    }

    fn call(&self, this: &ScriptValue, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        self.handler.report(
            TrapKind::Apply,
            args.iter().map(ScriptValue::to_log_string).collect(),
        );
        self.target.call(this, args)
    }

    fn is_callable(&self) -> bool {
        self.target.is_callable()
    }
}
