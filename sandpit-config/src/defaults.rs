//! Default value functions for configuration.
//!
//! Used as `#[serde(default = "crate::defaults::...")]` attributes so that a
//! partial YAML file only overrides the keys it names.

use std::path::PathBuf;

pub fn bool_true() -> bool {
    true
}

// ── Interception ───────────────────────────────────────────────────────────

pub fn function_name() -> String {
    "chromeIntercept".to_string()
}

pub fn target_object() -> String {
    "chrome".to_string()
}

pub fn log_path() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/tmp/sandpit.log")
    }
    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("sandpit.log")
    }
}

// ── Bridge ─────────────────────────────────────────────────────────────────

pub fn query_function() -> String {
    "cefQuery".to_string()
}

pub fn cancel_function() -> String {
    "cefQueryCancel".to_string()
}
