//! Edge-triggered tracking of whether the focused node is editable.

use crate::host::DomNode;

/// Editability class of the focused node in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FocusState {
    #[default]
    NonEditable,
    Editable,
}

impl FocusState {
    pub fn from_editable(is_editable: bool) -> Self {
        if is_editable {
            FocusState::Editable
        } else {
            FocusState::NonEditable
        }
    }

    pub fn is_editable(self) -> bool {
        self == FocusState::Editable
    }
}

/// Per-(browser, frame) focus state machine.
///
/// Starts in [`FocusState::NonEditable`]. Only transitions are reported;
/// focusing another node of the same class is a no-op.
#[derive(Debug, Default)]
pub struct FocusTracker {
    state: FocusState,
}

impl FocusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    /// Feed a focus change. `None` means focus left every node.
    ///
    /// Returns the new editability when it changed.
    pub fn on_focused_node_changed(&mut self, node: Option<&dyn DomNode>) -> Option<bool> {
        let is_editable = node.is_some_and(|n| n.is_editable());
        self.observe(is_editable)
    }

    /// Feed a precomputed editability value.
    pub fn observe(&mut self, is_editable: bool) -> Option<bool> {
        let next = FocusState::from_editable(is_editable);
        if next == self.state {
            return None;
        }
        log::trace!("FocusTracker: {:?} -> {:?}", self.state, next);
        self.state = next;
        Some(is_editable)
    }
}
