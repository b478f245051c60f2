//! Notification text.

use chrono::{DateTime, SecondsFormat, Utc};
use pterobot_types::{ActionParameters, ActionRequest, ExecutionOutcome};

/// Maximum characters in one chat message.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const TRUNCATION_MARK: &str = "...";

// Per-field caps for the audit fallback.
const MAX_LABEL_CHARS: usize = 150;
const MAX_DELIVERY_ERROR_CHARS: usize = 300;
const MAX_FIELD_CHARS: usize = 500;

/// One chat message, already cut to the platform limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    content: String,
}

impl OutboundMessage {
    /// Build a message, truncating to [`MAX_MESSAGE_CHARS`].
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        if content.chars().count() <= MAX_MESSAGE_CHARS {
            return Self { content };
        }
        Self {
            content: clip(&content, MAX_MESSAGE_CHARS),
        }
    }

    /// Message body.
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Direct message telling the target what happened to their server.
pub fn user_message(
    request: &ActionRequest,
    execution: &ExecutionOutcome,
    at: DateTime<Utc>,
) -> OutboundMessage {
    let text = match execution {
        ExecutionOutcome::Success(state) => match &request.parameters {
            ActionParameters::Create(spec) => {
                let limits = state.limits.unwrap_or(spec.limits);
                format!(
                    "Your server has been created.\nServer name: {}\nServer ID: {}\n{limits}",
                    spec.name, state.server
                )
            }
            ActionParameters::Delete { server } => format!(
                "Your server has been deleted.\nServer ID: {server}\nDeleted by: {}\nDate & time: {}",
                request.initiator,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            ActionParameters::Suspend { server, reason } => format!(
                "Your server has been suspended.\nServer ID: {server}\nReason: {}",
                reason_or_default(reason.as_deref())
            ),
            ActionParameters::Unsuspend { server, reason } => format!(
                "Your server has been unsuspended.\nServer ID: {server}\nReason: {}",
                reason_or_default(reason.as_deref())
            ),
            ActionParameters::UpdateResources { server, limits } => format!(
                "Your server's resources have been updated.\nServer ID: {server}\n{limits}"
            ),
        },
        ExecutionOutcome::Failed(error) => {
            let subject = request
                .parameters
                .server()
                .map_or_else(|| "a new server".to_owned(), |id| format!("server {id}"));
            format!(
                "An administrator attempted to {} {subject} for you, but it did not go through: {error}",
                verb(&request.parameters)
            )
        }
    };
    OutboundMessage::new(text)
}

/// Audit-channel record posted when the direct message could not be sent.
///
/// The fixed audit fields come first and every free-text field is capped on
/// its own, so a long reason or panel error never pushes the delivery error
/// or the request id past [`MAX_MESSAGE_CHARS`].
pub fn fallback_message(
    request: &ActionRequest,
    execution: &ExecutionOutcome,
    delivery_error: &str,
) -> OutboundMessage {
    let target = clip(&request.target.label(), MAX_LABEL_CHARS);
    let mut text = format!(
        "Failed to DM {target}. Admin log:\n\
         Action: {kind}\n\
         Target: {target}\n\
         Initiator: {initiator}\n\
         Request: {id}\n\
         Delivery error: {delivery}\n\
         Outcome: {outcome}",
        kind = request.kind(),
        initiator = request.initiator,
        id = request.id,
        delivery = clip(delivery_error, MAX_DELIVERY_ERROR_CHARS),
        outcome = clip(&execution.summary(), MAX_FIELD_CHARS),
    );
    if let Some(reason) = request.parameters.reason() {
        text.push_str("\nReason: ");
        text.push_str(&clip(reason, MAX_FIELD_CHARS));
    }
    OutboundMessage::new(text)
}

/// `text` cut to `max` characters, marked when anything was dropped.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let keep = max.saturating_sub(TRUNCATION_MARK.len());
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str(TRUNCATION_MARK);
    clipped
}

fn reason_or_default(reason: Option<&str>) -> &str {
    match reason {
        Some(r) if !r.trim().is_empty() => r,
        _ => "No reason provided",
    }
}

const fn verb(parameters: &ActionParameters) -> &'static str {
    match parameters {
        ActionParameters::Create(_) => "create",
        ActionParameters::Delete { .. } => "delete",
        ActionParameters::Suspend { .. } => "suspend",
        ActionParameters::Unsuspend { .. } => "unsuspend",
        ActionParameters::UpdateResources { .. } => "update the resources of",
    }
}

#[cfg(test)]
mod tests {
    use pterobot_types::{
        AdminPrincipal, LifecycleState, PanelApiError, PlatformUserId, ResultingState, ServerId,
        TargetUser,
    };

    use super::*;

    fn suspend_request(reason: Option<&str>) -> ActionRequest {
        ActionRequest::new(
            AdminPrincipal(PlatformUserId(1)),
            TargetUser {
                platform_id: PlatformUserId(42),
                panel_user_id: None,
                display_name: Some("alice".to_owned()),
            },
            ActionParameters::Suspend {
                server: ServerId(7),
                reason: reason.map(str::to_owned),
            },
        )
    }

    fn suspended() -> ExecutionOutcome {
        ExecutionOutcome::Success(ResultingState {
            server: ServerId(7),
            state: LifecycleState::Suspended,
            limits: None,
            already_in_state: false,
        })
    }

    #[test]
    fn long_text_is_cut_to_the_limit() {
        let message = OutboundMessage::new("x".repeat(5000));
        assert_eq!(message.content().chars().count(), MAX_MESSAGE_CHARS);
        assert!(message.content().ends_with("..."));
        assert_eq!(OutboundMessage::new("short").content(), "short");
    }

    #[test]
    fn suspend_notice_names_server_and_reason() {
        let text = user_message(&suspend_request(Some("unpaid invoice")), &suspended(), Utc::now());
        assert!(text.content().starts_with("Your server has been suspended."));
        assert!(text.content().contains("Server ID: 7"));
        assert!(text.content().contains("Reason: unpaid invoice"));

        let text = user_message(&suspend_request(None), &suspended(), Utc::now());
        assert!(text.content().contains("No reason provided"));
    }

    #[test]
    fn failed_action_is_still_explained() {
        let failed = ExecutionOutcome::Failed(PanelApiError::Unavailable {
            attempts: 3,
            detail: "HTTP 503".to_owned(),
        });
        let text = user_message(&suspend_request(None), &failed, Utc::now());
        assert!(text.content().contains("attempted to suspend server 7"));
        assert!(text.content().contains("HTTP 503"));
    }

    #[test]
    fn fallback_carries_audit_fields() {
        let request = suspend_request(Some("abuse"));
        let text = fallback_message(&request, &suspended(), "DMs closed");
        let content = text.content();
        assert!(content.starts_with("Failed to DM alice (42)."));
        assert!(content.contains("Action: suspend"));
        assert!(content.contains("Initiator: 1"));
        assert!(content.contains("Outcome: succeeded"));
        assert!(content.contains("Reason: abuse"));
        assert!(content.contains("Delivery error: DMs closed"));
        assert!(content.contains(&format!("Request: {}", request.id)));
    }

    #[test]
    fn long_reason_keeps_delivery_error_in_fallback() {
        let request = suspend_request(Some(&"x".repeat(2500)));
        let failed = ExecutionOutcome::Failed(PanelApiError::Rejected {
            status: Some(422),
            detail: "y".repeat(3000),
        });
        let text = fallback_message(&request, &failed, "Cannot send messages to this user");
        let content = text.content();
        assert!(content.chars().count() <= MAX_MESSAGE_CHARS);
        assert!(content.contains("Delivery error: Cannot send messages to this user"));
        assert!(content.contains(&format!("Request: {}", request.id)));
        assert!(content.contains("Reason: xxx"));
        assert!(content.ends_with("..."));
    }

    #[test]
    fn clip_marks_only_cut_text() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghij", 6), "abc...");
        assert_eq!(clip("ééééé", 5), "ééééé");
    }
}
