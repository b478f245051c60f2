//! Enumeration types shared across the pipeline.

use serde::{Deserialize, Serialize};

/// The privileged lifecycle actions an operator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Provision a new server for the target user.
    Create,
    /// Permanently remove a server.
    Delete,
    /// Suspend a server (it stays provisioned but cannot run).
    Suspend,
    /// Lift a suspension.
    Unsuspend,
    /// Change a server's resource limits.
    UpdateResources,
}

impl ActionKind {
    /// Stable snake-case name, used in log fields and audit messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Suspend => "suspend",
            Self::Unsuspend => "unsuspend",
            Self::UpdateResources => "update_resources",
        }
    }

    /// The lifecycle state a successful action leaves the server in.
    pub const fn target_state(self) -> LifecycleState {
        match self {
            Self::Create | Self::Unsuspend | Self::UpdateResources => LifecycleState::Active,
            Self::Delete => LifecycleState::Deleted,
            Self::Suspend => LifecycleState::Suspended,
        }
    }
}

impl core::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a server on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Provisioned and allowed to run.
    Active,
    /// Provisioned but suspended by an administrator.
    Suspended,
    /// No longer present on the panel.
    Deleted,
}

impl LifecycleState {
    /// Stable snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

impl core::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_states() {
        assert_eq!(ActionKind::Suspend.target_state(), LifecycleState::Suspended);
        assert_eq!(ActionKind::Unsuspend.target_state(), LifecycleState::Active);
        assert_eq!(ActionKind::Delete.target_state(), LifecycleState::Deleted);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ActionKind::UpdateResources).unwrap_or_default();
        assert_eq!(json, "\"update_resources\"");
        assert_eq!(ActionKind::UpdateResources.to_string(), "update_resources");
    }
}
