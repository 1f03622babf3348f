//! Script value and object model.
//!
//! [`ScriptObject`] is the one interface every wrapped object is reached
//! through: one method per fundamental operation a trap can observe. Hosts
//! bind their engine's objects to it; [`HostObject`] is a ready-made ordered
//! property bag for hosts (and tests) that keep objects natively.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Shared handle to a script-visible object.
pub type ObjectRef = Arc<dyn ScriptObject>;

/// Native implementation of a callable object: `(this, args) -> result`.
pub type NativeFn =
    Arc<dyn Fn(&ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError> + Send + Sync>;

/// Errors surfaced to script by object operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// The operation is not valid for the value (e.g. calling a non-function).
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A value thrown by the callee.
    #[error("Uncaught {0}")]
    Thrown(String),
}

/// The fundamental operations a wrapped object supports.
///
/// Implementations must be usable from whichever thread the host runs script
/// on, hence `Send + Sync`.
pub trait ScriptObject: Send + Sync {
    /// Read a property. Missing properties read as [`ScriptValue::Undefined`].
    fn get(&self, key: &str) -> ScriptValue;

    /// Write a property. Returns `false` if the write was refused.
    fn set(&self, key: &str, value: ScriptValue) -> bool;

    /// Membership test (`key in object`).
    fn has(&self, key: &str) -> bool;

    /// Own enumerable keys in enumeration order.
    fn own_keys(&self) -> Vec<String>;

    /// Invoke the object as a function.
    fn call(&self, _this: &ScriptValue, _args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        Err(ScriptError::TypeError("object is not a function".to_string()))
    }

    /// Whether [`ScriptObject::call`] is meaningful for this object.
    fn is_callable(&self) -> bool {
        false
    }
}

/// A script value as seen across the native boundary.
#[derive(Clone, Default)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object(ObjectRef),
}

impl ScriptValue {
    /// Borrow the inner object, if this value is one.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            ScriptValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow the inner string, if this value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Best-effort string form used for trap records.
    ///
    /// Strings pass through, primitives use their display form, arrays join
    /// their elements with `,`. Undefined, null and objects become empty.
    pub fn to_log_string(&self) -> String {
        match self {
            ScriptValue::Undefined | ScriptValue::Null | ScriptValue::Object(_) => String::new(),
            ScriptValue::Bool(b) => b.to_string(),
            ScriptValue::Number(n) => format_number(*n),
            ScriptValue::String(s) => s.clone(),
            ScriptValue::Array(items) => items
                .iter()
                .map(ScriptValue::to_log_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Undefined => write!(f, "Undefined"),
            ScriptValue::Null => write!(f, "Null"),
            ScriptValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            ScriptValue::Number(n) => f.debug_tuple("Number").field(n).finish(),
            ScriptValue::String(s) => f.debug_tuple("String").field(s).finish(),
            ScriptValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            ScriptValue::Object(obj) => write!(f, "Object({:p})", Arc::as_ptr(obj)),
        }
    }
}

/// Objects compare by identity, everything else by value.
impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScriptValue::Undefined, ScriptValue::Undefined) => true,
            (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
            (ScriptValue::Array(a), ScriptValue::Array(b)) => a == b,
            (ScriptValue::Object(a), ScriptValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<ObjectRef> for ScriptValue {
    fn from(obj: ObjectRef) -> Self {
        ScriptValue::Object(obj)
    }
}

/// An insertion-ordered property bag, optionally callable.
pub struct HostObject {
    properties: RwLock<Vec<(String, ScriptValue)>>,
    function: Option<NativeFn>,
}

impl HostObject {
    /// Create an empty, non-callable object.
    pub fn new() -> Self {
        Self {
            properties: RwLock::new(Vec::new()),
            function: None,
        }
    }

    /// Create a callable object backed by `function`.
    pub fn function(function: NativeFn) -> Self {
        Self {
            properties: RwLock::new(Vec::new()),
            function: Some(function),
        }
    }

    /// Builder-style property insertion.
    pub fn with(self, key: &str, value: impl Into<ScriptValue>) -> Self {
        self.set(key, value.into());
        self
    }

    /// Remove a property. Returns `true` if it existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut props = self.properties.write();
        let before = props.len();
        props.retain(|(k, _)| k != key);
        props.len() != before
    }

    /// Wrap into a shareable [`ObjectRef`].
    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }
}

impl Default for HostObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptObject for HostObject {
    fn get(&self, key: &str) -> ScriptValue {
        self.properties
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: ScriptValue) -> bool {
        let mut props = self.properties.write();
        match props.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => props.push((key.to_string(), value)),
        }
        true
    }

    fn has(&self, key: &str) -> bool {
        self.properties.read().iter().any(|(k, _)| k == key)
    }

    fn own_keys(&self) -> Vec<String> {
        self.properties.read().iter().map(|(k, _)| k.clone()).collect()
    }

    fn call(&self, this: &ScriptValue, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        match &self.function {
            Some(f) => f(this, args),
            None => Err(ScriptError::TypeError("object is not a function".to_string())),
        }
    }

    fn is_callable(&self) -> bool {
        self.function.is_some()
    }
}
