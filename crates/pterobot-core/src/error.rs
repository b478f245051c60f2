//! Error types for the action pipeline.
//!
//! Uses `thiserror` for typed errors at each remote seam. The retry policy
//! depends on these types, never on message text: a [`TransportError`] is
//! always transient, while a [`DeliveryError`] is always final for the
//! direct-message attempt.
//!
//! The user-visible [`PanelApiError`](pterobot_types::PanelApiError) lives
//! in `pterobot-types` because it is stored inside every `ActionRecord`.

use pterobot_types::AdminPrincipal;

/// The initiator is not on the admin allow-list.
///
/// This is a normal outcome, reported to the caller only. No remote call
/// was made and nothing was written to the audit channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{principal} is not allowed to run privileged actions")]
pub struct PermissionDenied {
    /// The rejected caller.
    pub principal: AdminPrincipal,
}

/// A single panel HTTP attempt did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The attempt exceeded its deadline.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Connection, TLS or protocol failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response arrived but its body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// A notification could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The platform refused the message (DMs closed, bot blocked, unknown
    /// channel, missing permission).
    #[error("rejected by chat platform (HTTP {status}): {detail}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Platform error message.
        detail: String,
    },

    /// The call exceeded its deadline.
    #[error("delivery timed out after {timeout_ms} ms")]
    Timeout {
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The platform could not be reached.
    #[error("chat platform unreachable: {0}")]
    Unreachable(String),
}

/// The record journal could not be written.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// File could not be opened or written.
    #[error("journal I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The record could not be serialized.
    #[error("journal serialization error: {source}")]
    Serde {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
