//! Shared integration test helpers for sandpit.
//!
//! Fake host collaborators (context, frame, DOM node) and config factories
//! used across the `tests/` suite.
//!
//! ```ignore
//! mod common;
//! use common::{FakeContext, FakeFrame, chrome_object};
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sandpit::{DomNode, Frame, ScriptContextHost};
use sandpit_bridge::{ContextId, FrameId};
use sandpit_config::Config;
use sandpit_intercept::{
    HostObject, NativeFn, ObjectRef, ScriptContext, ScriptError, ScriptFrame, ScriptObject,
    ScriptValue,
};
use tempfile::TempDir;

/// A script context backed by a plain global table.
pub struct FakeContext {
    id: ContextId,
    globals: Mutex<HashMap<String, ScriptValue>>,
}

impl FakeContext {
    pub fn new(id: u64) -> Self {
        Self {
            id: ContextId(id),
            globals: Mutex::new(HashMap::new()),
        }
    }

    /// Context whose `chrome` global is [`chrome_object`].
    pub fn with_chrome(id: u64) -> Self {
        let context = Self::new(id);
        context.set_global("chrome", ScriptValue::Object(chrome_object()));
        context
    }

    /// Object bound to a global, panicking if absent.
    pub fn object(&self, name: &str) -> ObjectRef {
        self.global(name)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_else(|| panic!("global {name} is not an object"))
    }

    /// Call a global function the way script would.
    pub fn call(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        self.object(name).call(&ScriptValue::Undefined, args)
    }
}

impl ScriptContext for FakeContext {
    fn global(&self, name: &str) -> Option<ScriptValue> {
        self.globals.lock().get(name).cloned()
    }

    fn set_global(&self, name: &str, value: ScriptValue) {
        self.globals.lock().insert(name.to_string(), value);
    }

    fn register_function(&self, name: &str, function: NativeFn) {
        self.set_global(name, ScriptValue::Object(HostObject::function(function).into_ref()));
    }
}

impl ScriptContextHost for FakeContext {
    fn id(&self) -> ContextId {
        self.id
    }
}

/// A frame that records the scripts it was asked to run.
pub struct FakeFrame {
    id: FrameId,
    pub scripts: Mutex<Vec<String>>,
}

impl FakeFrame {
    pub fn new(id: i64) -> Self {
        Self {
            id: FrameId(id),
            scripts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptFrame for FakeFrame {
    fn url(&self) -> String {
        format!("https://example.test/frame/{}", self.id.0)
    }

    fn execute_script(&self, source: &str, _url: &str, _start_line: u32) {
        self.scripts.lock().push(source.to_string());
    }
}

impl Frame for FakeFrame {
    fn id(&self) -> FrameId {
        self.id
    }
}

/// A focusable node.
pub struct FakeNode(pub bool);

impl DomNode for FakeNode {
    fn is_editable(&self) -> bool {
        self.0
    }
}

/// A stand-in for the privileged host object: a few properties and a
/// callable `loadTimes` that returns the number of arguments it got.
pub fn chrome_object() -> ObjectRef {
    let load_times: NativeFn = Arc::new(
        |_this: &ScriptValue, args: &[ScriptValue]| -> Result<ScriptValue, ScriptError> {
            Ok(ScriptValue::Number(args.len() as f64))
        },
    );
    HostObject::new()
        .with("app", HostObject::new().with("isInstalled", false).into_ref())
        .with("runtime", ScriptValue::Null)
        .with("loadTimes", HostObject::function(load_times).into_ref())
        .with("csi", "csi")
        .into_ref()
}

/// Default config whose trap log lives in a fresh temp dir.
///
/// Keep the `TempDir` alive for the duration of the test.
pub fn config_with_tmp_log() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = Config::default();
    config.intercept.log_path = temp_dir.path().join("sandpit.log");
    (config, temp_dir)
}
