//! Shared type definitions for the pterobot action pipeline.
//!
//! This crate is the single source of truth for the data exchanged between
//! the command layer, the pipeline in `pterobot-core`, and the record
//! journal. Everything here is plain serializable data.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for platform, panel and request identifiers
//! - [`enums`] -- Action kinds and server lifecycle states
//! - [`actions`] -- Action requests, parameters, limits and the resource view
//! - [`record`] -- Execution/notification outcomes, the `ActionRecord`, and
//!   the reply sent back to the command layer

pub mod actions;
pub mod enums;
pub mod ids;
pub mod record;

// Re-export all public types at crate root for convenience.
pub use actions::{
    ActionParameters, ActionRequest, AdminPrincipal, CreateSpec, LimitsError, ManagedResource,
    ResourceLimits, TargetUser,
};
pub use enums::{ActionKind, LifecycleState};
pub use ids::{ChannelId, PanelUserId, PlatformUserId, RequestId, ServerId};
pub use record::{
    ActionRecord, ActionReply, ExecutionOutcome, NotificationOutcome, PanelApiError,
    ResultingState,
};
