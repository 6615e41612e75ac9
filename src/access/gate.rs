//! Gate decisions over a caller's role set.

use serde::{Deserialize, Serialize};

use super::{Module, RoleSet};

/// How the allowed roles are matched against the caller's roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// At least one allowed role must be held.
    #[default]
    Any,
    /// Every required role must be held.
    All,
}

/// What a gate requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub roles: RoleSet,
    pub mode: MatchMode,
}

impl Requirement {
    pub fn any(roles: RoleSet) -> Self {
        Self {
            roles,
            mode: MatchMode::Any,
        }
    }

    pub fn all(roles: RoleSet) -> Self {
        Self {
            roles,
            mode: MatchMode::All,
        }
    }

    /// Requirement for a console module, resolved through the module table.
    pub fn module(module: Module) -> Self {
        Self::any(module.allowed_roles())
    }

    /// Whether `held` passes. The super-admin passes unconditionally.
    pub fn permits(&self, held: RoleSet) -> bool {
        if held.is_superadmin() {
            return true;
        }
        match self.mode {
            MatchMode::Any => held.any_of(self.roles),
            MatchMode::All => held.all_of(self.roles),
        }
    }
}

/// Caller's role set as seen by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    /// Lookup not finished, or it failed.
    Loading,
    Ready(RoleSet),
}

/// Behavior on denial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDeny {
    Fallback,
    Notice,
    #[default]
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Render,
    Fallback,
    AccessDenied,
    Nothing,
}

impl GateOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, GateOutcome::Render)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gate {
    pub requirement: Requirement,
    pub on_deny: OnDeny,
}

impl Gate {
    pub fn new(requirement: Requirement) -> Self {
        Self {
            requirement,
            on_deny: OnDeny::default(),
        }
    }

    pub fn on_deny(mut self, on_deny: OnDeny) -> Self {
        self.on_deny = on_deny;
        self
    }

    /// Decide what to show. While roles are loading nothing is shown.
    pub fn decide(&self, state: &RoleState) -> GateOutcome {
        let RoleState::Ready(held) = state else {
            return GateOutcome::Nothing;
        };

        if self.requirement.permits(*held) {
            return GateOutcome::Render;
        }

        match self.on_deny {
            OnDeny::Fallback => GateOutcome::Fallback,
            OnDeny::Notice => GateOutcome::AccessDenied,
            OnDeny::Nothing => GateOutcome::Nothing,
        }
    }
}
