//! Trap kinds and the records written for each observed operation.

use std::fmt;

/// The operation a trap observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    Get,
    Set,
    Has,
    OwnKeys,
    Apply,
    /// Baseline key listing taken once before the proxy goes in.
    Snapshot,
}

impl TrapKind {
    /// Every kind, in declaration order.
    pub const ALL: [TrapKind; 6] = [
        TrapKind::Get,
        TrapKind::Set,
        TrapKind::Has,
        TrapKind::OwnKeys,
        TrapKind::Apply,
        TrapKind::Snapshot,
    ];

    /// Kinds the proxy layer intercepts. Writes are deliberately absent.
    pub const PROXIED: [TrapKind; 4] = [
        TrapKind::Get,
        TrapKind::Has,
        TrapKind::OwnKeys,
        TrapKind::Apply,
    ];

    /// Symbolic name passed to the native callable and written to the log.
    pub fn label(self) -> &'static str {
        match self {
            TrapKind::Get => "get",
            TrapKind::Set => "set",
            TrapKind::Has => "has",
            TrapKind::OwnKeys => "ownKeys",
            TrapKind::Apply => "apply",
            TrapKind::Snapshot => "targetKeys",
        }
    }

    /// Inverse of [`TrapKind::label`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observed operation against a wrapped object.
///
/// Records carry no timestamp; their position in the sink is their order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapRecord {
    kind: TrapKind,
    target: String,
    args: Vec<String>,
}

impl TrapRecord {
    pub fn new(kind: TrapKind, target: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            args,
        }
    }

    pub fn kind(&self) -> TrapKind {
        self.kind
    }

    /// Global name of the wrapped object.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Property key(s) or stringified call arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Render the record as one newline-terminated log line.
    ///
    /// Shape: `<kind>: [<target>] |<arg1>|, |<arg2>|, `
    pub fn to_line(&self) -> String {
        let mut line = format!("{}: [{}] ", self.kind, self.target);
        for arg in &self.args {
            line.push('|');
            line.push_str(&sanitize(arg));
            line.push_str("|, ");
        }
        line.push('\n');
        line
    }
}

impl fmt::Display for TrapRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_line().trim_end_matches('\n'))
    }
}

// Keys come from untrusted script; a raw newline would split one record in two.
fn sanitize(arg: &str) -> std::borrow::Cow<'_, str> {
    if arg.contains(['\n', '\r']) {
        arg.replace('\n', "\\n").replace('\r', "\\r").into()
    } else {
        arg.into()
    }
}
