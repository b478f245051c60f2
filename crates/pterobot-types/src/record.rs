//! Outcome types and the [`ActionRecord`] audit artifact.
//!
//! A record is assembled exactly once, after both the execution and the
//! notification phase have finished. It has no setters: the notification
//! outcome is a required constructor argument, so a record can never be
//! observed with that phase pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionRequest, ResourceLimits};
use crate::enums::{ActionKind, LifecycleState};
use crate::ids::ServerId;

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Why a panel operation could not achieve its state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum PanelApiError {
    /// The panel (or local validation, when `status` is `None`) refused the
    /// request. Never retried.
    #[error("rejected{}: {detail}", status_suffix(.status))]
    Rejected {
        /// HTTP status, or `None` when rejected before any call was made.
        status: Option<u16>,
        /// Explanation suitable for the operator and the audit trail.
        detail: String,
    },
    /// The panel kept answering "too many requests".
    #[error("rate limited by the panel after {attempts} attempts")]
    RateLimited {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The panel was unreachable, timed out, or kept failing with 5xx.
    #[error("panel unavailable after {attempts} attempts: {detail}")]
    Unavailable {
        /// Attempts made before giving up.
        attempts: u32,
        /// Last transient failure observed.
        detail: String,
    },
}

impl PanelApiError {
    /// Shorthand for a rejection produced before any remote call.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Rejected {
            status: None,
            detail: detail.into(),
        }
    }
}

#[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// The state a server ended up in after a successful action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultingState {
    /// The server acted upon (the new server for `Create`).
    pub server: ServerId,
    /// Lifecycle state after the action.
    pub state: LifecycleState,
    /// Build limits after the action, when the panel reported them.
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
    /// The server was already in the target state; nothing changed remotely.
    #[serde(default)]
    pub already_in_state: bool,
}

/// Result of the execution phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The intended state transition completed (or was already in place).
    Success(ResultingState),
    /// The transition did not happen.
    Failed(PanelApiError),
}

impl ExecutionOutcome {
    /// Whether the action took effect.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// One-line summary for messages and logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Success(state) if state.already_in_state => {
                format!("succeeded (server {} was already {})", state.server, state.state)
            }
            Self::Success(state) => {
                format!("succeeded (server {} is now {})", state.server, state.state)
            }
            Self::Failed(err) => format!("failed: {err}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Result of the notification phase. Exactly one per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// The target received a direct message.
    Delivered,
    /// Direct delivery failed; the audit channel received a fallback record.
    FallbackLogged {
        /// Why the direct message could not be delivered.
        delivery_error: String,
    },
    /// Neither the direct message nor the fallback post went through.
    NotificationFailed {
        /// Why the direct message could not be delivered.
        delivery_error: String,
        /// Why the fallback post could not be written.
        fallback_error: String,
    },
}

impl NotificationOutcome {
    /// Stable snake-case name for log fields.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::FallbackLogged { .. } => "fallback_logged",
            Self::NotificationFailed { .. } => "notification_failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Immutable audit artifact for one authorized [`ActionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    request: ActionRequest,
    execution: ExecutionOutcome,
    notification: NotificationOutcome,
    recorded_at: DateTime<Utc>,
}

impl ActionRecord {
    /// Seal a record once both phases have completed.
    pub fn new(
        request: ActionRequest,
        execution: ExecutionOutcome,
        notification: NotificationOutcome,
    ) -> Self {
        Self {
            request,
            execution,
            notification,
            recorded_at: Utc::now(),
        }
    }

    /// The originating request.
    pub const fn request(&self) -> &ActionRequest {
        &self.request
    }

    /// The action kind.
    pub const fn kind(&self) -> ActionKind {
        self.request.kind()
    }

    /// Execution phase outcome.
    pub const fn execution(&self) -> &ExecutionOutcome {
        &self.execution
    }

    /// Notification phase outcome.
    pub const fn notification(&self) -> &NotificationOutcome {
        &self.notification
    }

    /// When the record was sealed.
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Whether the outcome could not be communicated to anyone.
    pub const fn is_degraded(&self) -> bool {
        matches!(self.notification, NotificationOutcome::NotificationFailed { .. })
    }

    /// Warning for the caller when the record is degraded.
    pub fn warning(&self) -> Option<String> {
        match &self.notification {
            NotificationOutcome::NotificationFailed {
                delivery_error,
                fallback_error,
            } => Some(format!(
                "{} for {} {} but could not be recorded or notified \
                 (direct message: {delivery_error}; audit channel: {fallback_error})",
                self.kind(),
                self.request.target.label(),
                self.execution.summary(),
            )),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire reply
// ---------------------------------------------------------------------------

/// Reply sent back to the command layer for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ActionReply {
    /// The request was authorized and ran to completion.
    Recorded {
        /// The sealed record.
        record: Box<ActionRecord>,
        /// Present when the outcome could not be notified or recorded.
        #[serde(default)]
        warning: Option<String>,
    },
    /// The initiator is not on the allow-list; nothing was executed.
    Denied {
        /// The rejected caller.
        initiator: crate::actions::AdminPrincipal,
    },
    /// The payload was not a valid request.
    Malformed {
        /// Parse error.
        detail: String,
    },
}

impl ActionReply {
    /// Wrap a finished record, attaching its warning if degraded.
    pub fn recorded(record: ActionRecord) -> Self {
        let warning = record.warning();
        Self::Recorded {
            record: Box::new(record),
            warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionParameters, AdminPrincipal, TargetUser};
    use crate::ids::PlatformUserId;

    fn suspend_request() -> ActionRequest {
        ActionRequest::new(
            AdminPrincipal(PlatformUserId(1)),
            TargetUser {
                platform_id: PlatformUserId(2),
                panel_user_id: None,
                display_name: Some("bob".to_owned()),
            },
            ActionParameters::Suspend {
                server: ServerId(9),
                reason: None,
            },
        )
    }

    #[test]
    fn rejected_display_includes_status_when_known() {
        let remote = PanelApiError::Rejected {
            status: Some(422),
            detail: "allocation missing".to_owned(),
        };
        assert_eq!(remote.to_string(), "rejected (HTTP 422): allocation missing");
        assert_eq!(
            PanelApiError::invalid("bad cpu").to_string(),
            "rejected: bad cpu"
        );
    }

    #[test]
    fn degraded_record_carries_warning() {
        let record = ActionRecord::new(
            suspend_request(),
            ExecutionOutcome::Failed(PanelApiError::RateLimited { attempts: 5 }),
            NotificationOutcome::NotificationFailed {
                delivery_error: "user blocks DMs".to_owned(),
                fallback_error: "channel missing".to_owned(),
            },
        );
        assert!(record.is_degraded());
        let warning = record.warning().unwrap_or_default();
        assert!(warning.contains("suspend for bob (2) failed"));
        assert!(warning.contains("channel missing"));
    }

    #[test]
    fn delivered_record_has_no_warning() {
        let record = ActionRecord::new(
            suspend_request(),
            ExecutionOutcome::Success(ResultingState {
                server: ServerId(9),
                state: LifecycleState::Suspended,
                limits: None,
                already_in_state: false,
            }),
            NotificationOutcome::Delivered,
        );
        assert!(!record.is_degraded());
        assert_eq!(record.warning(), None);
        assert!(matches!(
            ActionReply::recorded(record),
            ActionReply::Recorded { warning: None, .. }
        ));
    }
}
