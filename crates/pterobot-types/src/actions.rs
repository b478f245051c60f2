//! Action request types: who asked, who is affected, and what to do.
//!
//! An [`ActionRequest`] is built once per invocation by the command layer
//! and never mutated afterwards. Its [`ActionKind`] is derived from the
//! [`ActionParameters`] variant so the two cannot disagree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ActionKind, LifecycleState};
use crate::ids::{PanelUserId, PlatformUserId, RequestId, ServerId};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// The operator who invoked an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminPrincipal(pub PlatformUserId);

impl AdminPrincipal {
    /// The caller's chat-platform id.
    pub const fn id(self) -> PlatformUserId {
        self.0
    }
}

impl core::fmt::Display for AdminPrincipal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The end user affected by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUser {
    /// Chat-platform id, used to deliver the notification.
    pub platform_id: PlatformUserId,
    /// Panel account id, used to correlate with the panel. Required for
    /// `Create` (it becomes the server owner); informational otherwise.
    #[serde(default)]
    pub panel_user_id: Option<PanelUserId>,
    /// Display name for messages; falls back to the platform id.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl TargetUser {
    /// Human-readable label, e.g. `alice (311234567890123456)`.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => format!("{name} ({})", self.platform_id),
            None => self.platform_id.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource limits
// ---------------------------------------------------------------------------

/// Accepted memory range in MB.
pub const MEMORY_RANGE_MB: core::ops::RangeInclusive<u32> = 128..=32_768;
/// Accepted CPU range in percent of one core.
pub const CPU_RANGE_PERCENT: core::ops::RangeInclusive<u32> = 1..=400;
/// Accepted disk range in MB.
pub const DISK_RANGE_MB: core::ops::RangeInclusive<u32> = 100..=1_000_000;

/// Build limits applied to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory in MB.
    pub memory_mb: u32,
    /// CPU in percent (100 = one full core).
    pub cpu_percent: u32,
    /// Disk in MB.
    pub disk_mb: u32,
    /// Swap in MB.
    #[serde(default)]
    pub swap_mb: u32,
    /// Block IO weight.
    #[serde(default = "default_io_weight")]
    pub io_weight: u32,
}

/// A limit outside its accepted range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitsError {
    /// Memory outside [`MEMORY_RANGE_MB`].
    #[error("memory must be between 128 MB and 32768 MB (got {0} MB)")]
    Memory(u32),
    /// CPU outside [`CPU_RANGE_PERCENT`].
    #[error("cpu must be between 1% and 400% (got {0}%)")]
    Cpu(u32),
    /// Disk outside [`DISK_RANGE_MB`].
    #[error("disk must be between 100 MB and 1 TB (got {0} MB)")]
    Disk(u32),
}

impl ResourceLimits {
    /// Limits with default swap (0) and IO weight (500).
    pub const fn new(memory_mb: u32, cpu_percent: u32, disk_mb: u32) -> Self {
        Self {
            memory_mb,
            cpu_percent,
            disk_mb,
            swap_mb: 0,
            io_weight: default_io_weight(),
        }
    }

    /// Check every limit against its accepted range.
    pub fn validate(&self) -> Result<(), LimitsError> {
        if !MEMORY_RANGE_MB.contains(&self.memory_mb) {
            return Err(LimitsError::Memory(self.memory_mb));
        }
        if !CPU_RANGE_PERCENT.contains(&self.cpu_percent) {
            return Err(LimitsError::Cpu(self.cpu_percent));
        }
        if !DISK_RANGE_MB.contains(&self.disk_mb) {
            return Err(LimitsError::Disk(self.disk_mb));
        }
        Ok(())
    }
}

impl core::fmt::Display for ResourceLimits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "RAM {} MB, CPU {}%, disk {} MB",
            self.memory_mb, self.cpu_percent, self.disk_mb
        )
    }
}

const fn default_io_weight() -> u32 {
    500
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Everything needed to provision a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSpec {
    /// Server name (the panel caps it at 191 characters).
    pub name: String,
    /// Egg (server template) id.
    pub egg_id: u64,
    /// Node the server should live on.
    pub node_id: u64,
    /// Docker image to run.
    pub docker_image: String,
    /// Startup command; the egg default is used when absent.
    #[serde(default)]
    pub startup: Option<String>,
    /// Egg environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Primary allocation (ip:port) id; deployment-dependent.
    #[serde(default)]
    pub allocation_id: Option<u64>,
    /// Initial build limits.
    pub limits: ResourceLimits,
}

/// Action-specific parameters. Each variant corresponds to one [`ActionKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionParameters {
    /// Parameters for [`ActionKind::Create`].
    Create(CreateSpec),
    /// Parameters for [`ActionKind::Delete`].
    Delete {
        /// Server to remove.
        server: ServerId,
    },
    /// Parameters for [`ActionKind::Suspend`].
    Suspend {
        /// Server to suspend.
        server: ServerId,
        /// Reason shown to the user.
        #[serde(default)]
        reason: Option<String>,
    },
    /// Parameters for [`ActionKind::Unsuspend`].
    Unsuspend {
        /// Server to unsuspend.
        server: ServerId,
        /// Reason shown to the user.
        #[serde(default)]
        reason: Option<String>,
    },
    /// Parameters for [`ActionKind::UpdateResources`].
    UpdateResources {
        /// Server to resize.
        server: ServerId,
        /// Target limits.
        limits: ResourceLimits,
    },
}

impl ActionParameters {
    /// The action kind these parameters describe.
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Create(_) => ActionKind::Create,
            Self::Delete { .. } => ActionKind::Delete,
            Self::Suspend { .. } => ActionKind::Suspend,
            Self::Unsuspend { .. } => ActionKind::Unsuspend,
            Self::UpdateResources { .. } => ActionKind::UpdateResources,
        }
    }

    /// The existing server acted upon, if any (`None` for `Create`).
    pub const fn server(&self) -> Option<ServerId> {
        match self {
            Self::Create(_) => None,
            Self::Delete { server }
            | Self::Suspend { server, .. }
            | Self::Unsuspend { server, .. }
            | Self::UpdateResources { server, .. } => Some(*server),
        }
    }

    /// Operator-supplied reason, if the action carries one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Suspend { reason, .. } | Self::Unsuspend { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One privileged action, as requested by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Unique id for correlation across logs, journal and panel.
    #[serde(default)]
    pub id: RequestId,
    /// Who asked.
    pub initiator: AdminPrincipal,
    /// Who is affected.
    pub target: TargetUser,
    /// What to do.
    pub parameters: ActionParameters,
    /// When the command layer received the request.
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl ActionRequest {
    /// Build a request stamped with a fresh id and the current time.
    pub fn new(initiator: AdminPrincipal, target: TargetUser, parameters: ActionParameters) -> Self {
        Self {
            id: RequestId::new(),
            initiator,
            target,
            parameters,
            submitted_at: Utc::now(),
        }
    }

    /// The action kind, derived from the parameters.
    pub const fn kind(&self) -> ActionKind {
        self.parameters.kind()
    }
}

// ---------------------------------------------------------------------------
// Remote resource view
// ---------------------------------------------------------------------------

/// Transient view of a server as the panel reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    /// Numeric application-API id.
    pub id: ServerId,
    /// Short client identifier (e.g. `1a7ce997`).
    pub identifier: String,
    /// Server name.
    pub name: String,
    /// Owning panel account.
    pub owner: PanelUserId,
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// Current build limits.
    pub limits: ResourceLimits,
    /// Primary allocation id.
    pub allocation_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_validation_bounds() {
        assert!(ResourceLimits::new(128, 1, 100).validate().is_ok());
        assert!(ResourceLimits::new(32_768, 400, 1_000_000).validate().is_ok());
        assert_eq!(
            ResourceLimits::new(64, 100, 1000).validate(),
            Err(LimitsError::Memory(64))
        );
        assert_eq!(
            ResourceLimits::new(1024, 0, 1000).validate(),
            Err(LimitsError::Cpu(0))
        );
        assert_eq!(
            ResourceLimits::new(1024, 100, 99).validate(),
            Err(LimitsError::Disk(99))
        );
    }

    #[test]
    fn kind_follows_parameters() {
        let params = ActionParameters::Suspend {
            server: ServerId(7),
            reason: Some("unpaid".to_owned()),
        };
        assert_eq!(params.kind(), ActionKind::Suspend);
        assert_eq!(params.server(), Some(ServerId(7)));
        assert_eq!(params.reason(), Some("unpaid"));
    }

    #[test]
    fn request_deserializes_from_command_layer_json() {
        let json = r#"{
            "initiator": 1001,
            "target": { "platform_id": 2002 },
            "parameters": { "kind": "delete", "server": 15 }
        }"#;
        let request: Result<ActionRequest, _> = serde_json::from_str(json);
        assert!(request.is_ok(), "{request:?}");
        if let Ok(request) = request {
            assert_eq!(request.kind(), ActionKind::Delete);
            assert_eq!(request.initiator.id(), PlatformUserId(1001));
            assert_eq!(request.target.panel_user_id, None);
        }
    }

    #[test]
    fn create_parameters_are_flattened_under_tag() {
        let json = r#"{
            "kind": "create",
            "name": "survival",
            "egg_id": 3,
            "node_id": 1,
            "docker_image": "ghcr.io/pterodactyl/yolks:java_17",
            "limits": { "memory_mb": 2048, "cpu_percent": 100, "disk_mb": 10000 }
        }"#;
        let params: Result<ActionParameters, _> = serde_json::from_str(json);
        assert!(params.is_ok(), "{params:?}");
        if let Ok(ActionParameters::Create(spec)) = params {
            assert_eq!(spec.limits.io_weight, 500);
            assert_eq!(spec.allocation_id, None);
        }
    }

    #[test]
    fn target_label_prefers_display_name() {
        let mut target = TargetUser {
            platform_id: PlatformUserId(5),
            panel_user_id: None,
            display_name: None,
        };
        assert_eq!(target.label(), "5");
        target.display_name = Some("alice".to_owned());
        assert_eq!(target.label(), "alice (5)");
    }
}
