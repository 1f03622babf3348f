//! Puts an [`InterceptProxy`] in place of a named global at context creation.
//!
//! Two strategies are supported. [`ProxyInstaller::install`] wraps the object
//! natively through [`ScriptContext`]. [`ProxyInstaller::install_with_script`]
//! generates a bootstrap script from [`TrapKind::PROXIED`] and has the frame
//! run it, for engines whose proxies can only be built in script. Both
//! register the native callable first and take the `targetKeys` baseline
//! before the global is rebound.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::handler::InterceptHandler;
use crate::proxy::InterceptProxy;
use crate::sink::TrapSink;
use crate::trap::TrapKind;
use crate::value::{NativeFn, ObjectRef, ScriptValue};

/// Global-scope access the installer needs from a script context.
pub trait ScriptContext {
    /// Look up a global binding.
    fn global(&self, name: &str) -> Option<ScriptValue>;

    /// Create or replace a global binding.
    fn set_global(&self, name: &str, value: ScriptValue);

    /// Expose a native callable under `name`.
    fn register_function(&self, name: &str, function: NativeFn);
}

/// Script execution entry point of the frame that owns a context.
pub trait ScriptFrame {
    /// URL reported as the script's source location.
    fn url(&self) -> String;

    /// Run `source` in the frame's main world.
    fn execute_script(&self, source: &str, url: &str, start_line: u32);
}

/// Per-context result of an installation.
///
/// Owned by whoever owns the context; [`Installation::revoke`] must be called
/// when the context is released.
pub struct Installation {
    handler: Arc<InterceptHandler>,
    proxied: bool,
}

impl Installation {
    /// Whether the target existed and a proxy was put in place.
    ///
    /// Always `false` for script installs, whose outcome happens inside the
    /// engine.
    pub fn is_proxied(&self) -> bool {
        self.proxied
    }

    pub fn handler(&self) -> &Arc<InterceptHandler> {
        &self.handler
    }

    /// Turn every later trap report for this context into a no-op.
    pub fn revoke(&self) {
        self.handler.revoke();
    }
}

/// Installs interception for one named global in every new context.
pub struct ProxyInstaller {
    function_name: String,
    target_name: String,
    sink: Arc<dyn TrapSink>,
}

impl ProxyInstaller {
    /// # Arguments
    /// * `function_name` - Global name for the native callable.
    /// * `target_name` - Global name of the host object to wrap.
    /// * `sink` - Destination for records. Handlers only hold it weakly.
    pub fn new(
        function_name: impl Into<String>,
        target_name: impl Into<String>,
        sink: Arc<dyn TrapSink>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            target_name: target_name.into(),
            sink,
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    fn register(&self, context: &dyn ScriptContext) -> Arc<InterceptHandler> {
        let handler = Arc::new(InterceptHandler::new(self.target_name.clone(), &self.sink));
        context.register_function(&self.function_name, handler.native_function());
        handler
    }

    /// Wrap the target global natively.
    ///
    /// A missing or non-object target leaves the context untouched apart from
    /// the registered callable, and writes no record.
    pub fn install(&self, context: &dyn ScriptContext) -> Installation {
        let handler = self.register(context);

        let target: ObjectRef = match context.global(&self.target_name) {
            Some(ScriptValue::Object(obj)) => obj,
            _ => {
                log::debug!(
                    "ProxyInstaller: global {:?} not present, skipping proxy",
                    self.target_name
                );
                return Installation {
                    handler,
                    proxied: false,
                };
            }
        };

        handler.report(TrapKind::Snapshot, target.own_keys());

        let proxy: ObjectRef = Arc::new(InterceptProxy::new(target, Arc::clone(&handler)));
        context.set_global(&self.target_name, ScriptValue::Object(proxy));
        log::info!("ProxyInstaller: wrapped global {:?}", self.target_name);

        Installation {
            handler,
            proxied: true,
        }
    }

    /// Register the callable and have `frame` run the generated bootstrap.
    pub fn install_with_script(
        &self,
        context: &dyn ScriptContext,
        frame: &dyn ScriptFrame,
    ) -> Installation {
        let handler = self.register(context);
        frame.execute_script(&self.bootstrap_script(), &frame.url(), 0);
        Installation {
            handler,
            proxied: false,
        }
    }

    /// Generate the script that wraps the target in a `Proxy`.
    ///
    /// The trap list comes from [`TrapKind::PROXIED`], so `set` never appears.
    pub fn bootstrap_script(&self) -> String {
        let f = &self.function_name;
        let t = &self.target_name;
        let mut script = String::new();

        let _ = write!(
            script,
            "(function() {{\
             if (typeof window.{t} !== 'object' && typeof window.{t} !== 'function') return;\
             if (window.{t} === null) return;\
             window.{f}('{snapshot}', ...Object.keys(window.{t}));\
             window.{t} = new Proxy(window.{t}, {{",
            snapshot = TrapKind::Snapshot.label(),
        );

        let traps: Vec<String> = TrapKind::PROXIED
            .iter()
            .map(|kind| trap_source(*kind, f))
            .collect();
        script.push_str(&traps.join(","));
        script.push_str("});})();");
        script
    }
}

fn trap_source(kind: TrapKind, f: &str) -> String {
    let label = kind.label();
    match kind {
        TrapKind::Get => format!(
            "get: function (target, key, receiver) {{\
             window.{f}('{label}', key);\
             return target[key];}}"
        ),
        TrapKind::Has => format!(
            "has: function (target, key) {{\
             window.{f}('{label}', key);\
             return key in target;}}"
        ),
        TrapKind::OwnKeys => format!(
            "ownKeys: function (target) {{\
             const keys = Object.keys(target);\
             window.{f}('{label}', ...keys);\
             return [...keys];}}"
        ),
        TrapKind::Apply => format!(
            "apply: function (target, thisArg, args) {{\
             window.{f}('{label}', ...args);\
             return Reflect.apply(target, thisArg, args);}}"
        ),
        TrapKind::Set | TrapKind::Snapshot => String::new(),
    }
}
