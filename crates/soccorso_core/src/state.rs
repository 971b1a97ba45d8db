//! Shared state, actions and the transition function.
//!
//! [`SharedState`] is the slice of application state that is kept consistent
//! across contexts. Every change to it goes through an [`Action`], and the
//! new value is always computed by [`reduce`], which is pure and total.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The synchronized subset of application state.
///
/// Both fields are independently settable. A dispatch center selection only
/// makes sense together with a region, but this is not enforced here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    /// Identifier of the selected region (e.g. `"lombardia"`).
    #[serde(default)]
    pub selected_region: Option<String>,
    /// Identifier of the selected dispatch center (e.g. `"SRL"`).
    #[serde(default)]
    pub selected_dispatch_center: Option<String>,
}

impl SharedState {
    /// Create a state with both selections set.
    pub fn new(region: Option<&str>, dispatch_center: Option<&str>) -> Self {
        Self {
            selected_region: region.map(str::to_string),
            selected_dispatch_center: dispatch_center.map(str::to_string),
        }
    }

    /// Whether a region is selected.
    pub fn has_region(&self) -> bool {
        self.selected_region.is_some()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.selected_region.is_none() && self.selected_dispatch_center.is_none()
    }
}

/// The kind of state transition requested, with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Replace the selected region. The dispatch center is left untouched.
    SetRegion(Option<String>),
    /// Replace the selected dispatch center only.
    SetDispatchCenter(Option<String>),
    /// Clear both selections.
    Reset,
    /// Overwrite the whole state with a value received from another context.
    ApplyExternalState(SharedState),
    /// Overwrite the whole state with the value read from durable storage.
    LoadFromStorage(SharedState),
}

impl ActionKind {
    /// Replay kinds only consume state that already exists elsewhere.
    pub fn is_replay(&self) -> bool {
        matches!(
            self,
            ActionKind::ApplyExternalState(_) | ActionKind::LoadFromStorage(_)
        )
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::SetRegion(_) => "SetRegion",
            ActionKind::SetDispatchCenter(_) => "SetDispatchCenter",
            ActionKind::Reset => "Reset",
            ActionKind::ApplyExternalState(_) => "ApplyExternalState",
            ActionKind::LoadFromStorage(_) => "LoadFromStorage",
        }
    }
}

/// A state-transition request.
///
/// `shareable` marks whether a state-changing application of this action is
/// broadcast to other contexts. Replay kinds can never be shareable: the
/// constructors force the flag off for them, and the field is private so it
/// can't be set afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    kind: ActionKind,
    shareable: bool,
}

impl Action {
    /// An action that only affects this context (still persisted on change).
    pub fn local(kind: ActionKind) -> Self {
        Self {
            kind,
            shareable: false,
        }
    }

    /// An action whose change is persisted and broadcast to other contexts.
    pub fn shared(kind: ActionKind) -> Self {
        let shareable = !kind.is_replay();
        Self { kind, shareable }
    }

    /// Build a `SetRegion` action.
    pub fn set_region(region: impl Into<String>, shareable: bool) -> Self {
        Self::with_flag(ActionKind::SetRegion(Some(region.into())), shareable)
    }

    /// Build a `SetDispatchCenter` action.
    pub fn set_dispatch_center(center: impl Into<String>, shareable: bool) -> Self {
        Self::with_flag(ActionKind::SetDispatchCenter(Some(center.into())), shareable)
    }

    /// Build a `Reset` action.
    pub fn reset(shareable: bool) -> Self {
        Self::with_flag(ActionKind::Reset, shareable)
    }

    /// Build an `ApplyExternalState` action. Never shareable.
    pub fn apply_external(state: SharedState) -> Self {
        Self::local(ActionKind::ApplyExternalState(state))
    }

    /// Build a `LoadFromStorage` action. Never shareable.
    pub fn load_from_storage(state: SharedState) -> Self {
        Self::local(ActionKind::LoadFromStorage(state))
    }

    fn with_flag(kind: ActionKind, shareable: bool) -> Self {
        if shareable {
            Self::shared(kind)
        } else {
            Self::local(kind)
        }
    }

    /// The requested transition.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Whether a change caused by this action is broadcast.
    pub fn is_shareable(&self) -> bool {
        self.shareable
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Action::local(kind)
    }
}

/// Compute the state that results from applying `kind` to `state`.
pub fn reduce(state: &SharedState, kind: &ActionKind) -> SharedState {
    match kind {
        ActionKind::SetRegion(region) => SharedState {
            selected_region: region.clone(),
            ..state.clone()
        },
        ActionKind::SetDispatchCenter(center) => SharedState {
            selected_dispatch_center: center.clone(),
            ..state.clone()
        },
        ActionKind::Reset => SharedState::default(),
        ActionKind::ApplyExternalState(next) | ActionKind::LoadFromStorage(next) => next.clone(),
    }
}
