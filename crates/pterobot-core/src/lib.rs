//! Action execution pipeline for the pterobot panel bot.
//!
//! Takes a fully-formed [`ActionRequest`](pterobot_types::ActionRequest),
//! checks the initiator against the admin allow-list, executes the action
//! against the panel's application API, tells the affected user what
//! happened (or leaves a record in the audit channel when that fails) and
//! returns an immutable [`ActionRecord`](pterobot_types::ActionRecord).
//!
//! # Modules
//!
//! - [`config`] -- `pterobot.yaml` loading with environment overrides.
//! - [`error`] -- Typed errors for each remote seam.
//! - [`permission`] -- [`PermissionGate`], the admin allow-list.
//! - [`retry`] -- Attempt classification and exponential backoff.
//! - [`limiter`] -- [`CallLimiter`], the process-wide cap on in-flight panel calls.
//! - [`panel`] -- [`PanelActionClient`] and the [`PanelTransport`] seam.
//! - [`notify`] -- [`NotificationRouter`] and the [`ChatGateway`] seam.
//! - [`journal`] -- [`RecordJournal`], the optional JSONL record sink.
//! - [`orchestrator`] -- [`ActionOrchestrator`], which ties it all together.
//! - [`secret`] -- [`Secret`], a credential that never prints.

pub mod config;
pub mod error;
pub mod journal;
pub mod limiter;
pub mod notify;
pub mod orchestrator;
pub mod panel;
pub mod permission;
pub mod retry;
pub mod secret;

pub use config::{ConfigError, PipelineConfig};
pub use error::{DeliveryError, JournalError, PermissionDenied, TransportError};
pub use journal::RecordJournal;
pub use limiter::CallLimiter;
pub use notify::{ChatGateway, DiscordGateway, NotificationRouter, OutboundMessage};
pub use orchestrator::ActionOrchestrator;
pub use panel::{
    CreatePayloadStrategy, HttpPanelTransport, Method, PanelAccount, PanelActionClient,
    PanelCall, PanelResponse, PanelTransport, StandardCreatePayload,
};
pub use permission::PermissionGate;
pub use retry::{Attempt, RetryPolicy};
pub use secret::Secret;
