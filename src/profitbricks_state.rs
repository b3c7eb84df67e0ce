//! Desired state and action planning.
//!
//! A reconciler observes one resource, then asks `plan` what to do about it.
//! Planning is pure: the same (desired state, observation) pair always yields
//! the same action, so check mode can report `changed` without touching the API.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::profitbricks_result::Action;

/// State requested by the `state` module parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// Resource exists (created when missing).
    #[default]
    Present,
    /// Resource does not exist (deleted when found).
    Absent,
    /// Resource exists with the given properties.
    Update,
    /// Server is powered on.
    Running,
    /// Server is powered off.
    Stopped,
}

impl DesiredState {
    /// Parameter spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Update => "update",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    /// Action reported in the result envelope for this state.
    #[must_use]
    pub const fn action(self) -> Action {
        match self {
            Self::Present => Action::Create,
            Self::Absent => Action::Delete,
            Self::Update => Action::Update,
            Self::Running => Action::Start,
            Self::Stopped => Action::Stop,
        }
    }

    /// Power state a server must reach, for `running` and `stopped`.
    #[must_use]
    pub const fn power_target(self) -> Option<PowerState> {
        match self {
            Self::Running => Some(PowerState::Running),
            Self::Stopped => Some(PowerState::Stopped),
            Self::Present | Self::Absent | Self::Update => None,
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerState {
    /// `vmState` is `RUNNING`.
    Running,
    /// `vmState` is `SHUTOFF`, `SHUTDOWN` or `INACTIVE`.
    Stopped,
}

impl PowerState {
    /// Whether a reported `vmState` satisfies this power state.
    #[must_use]
    pub fn matches(self, vm_state: &str) -> bool {
        match self {
            Self::Running => vm_state.eq_ignore_ascii_case("RUNNING"),
            Self::Stopped => ["SHUTOFF", "SHUTDOWN", "INACTIVE"]
                .iter()
                .any(|s| vm_state.eq_ignore_ascii_case(s)),
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// What the reconciler saw for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No resource matches.
    NotFound,
    /// Exactly one resource matches.
    Found {
        /// The resource already satisfies the requested state
        /// (same properties for `update`, same power state for `running`/`stopped`).
        in_sync: bool,
    },
}

impl Observation {
    /// Observation of a resource that may be missing.
    #[must_use]
    pub const fn of(found: bool, in_sync: bool) -> Self {
        if found {
            Self::Found { in_sync }
        } else {
            Self::NotFound
        }
    }
}

/// Action the reconciler must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    /// Nothing to do.
    Noop,
    /// Create the resource.
    Create,
    /// Patch the resource.
    Update,
    /// Delete the resource.
    Delete,
    /// Power the server on.
    Start,
    /// Power the server off.
    Stop,
    /// The state needs an existing resource and none matched.
    Unresolved,
}

impl PlannedAction {
    /// Whether executing the action changes infrastructure.
    #[must_use]
    pub const fn changes(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Delete | Self::Start | Self::Stop
        )
    }
}

/// Decide the action for a desired state and an observation.
#[must_use]
pub const fn plan(desired: DesiredState, observation: Observation) -> PlannedAction {
    match (desired, observation) {
        (DesiredState::Present, Observation::NotFound) => PlannedAction::Create,
        (DesiredState::Absent, Observation::Found { .. }) => PlannedAction::Delete,
        (DesiredState::Update, Observation::Found { in_sync: false }) => PlannedAction::Update,
        (DesiredState::Running, Observation::Found { in_sync: false }) => PlannedAction::Start,
        (DesiredState::Stopped, Observation::Found { in_sync: false }) => PlannedAction::Stop,
        (
            DesiredState::Update | DesiredState::Running | DesiredState::Stopped,
            Observation::NotFound,
        ) => PlannedAction::Unresolved,
        (DesiredState::Present, Observation::Found { .. })
        | (DesiredState::Absent, Observation::NotFound)
        | (
            DesiredState::Update | DesiredState::Running | DesiredState::Stopped,
            Observation::Found { in_sync: true },
        ) => PlannedAction::Noop,
    }
}
