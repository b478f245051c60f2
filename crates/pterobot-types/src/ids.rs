//! Type-safe identifier wrappers.
//!
//! Chat-platform identities (users, channels) and panel identities (users,
//! servers) are all plain integers on the wire. Wrapping each in its own
//! newtype keeps a Discord user id from ever being passed where a panel
//! user id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a `u64` remote identifier.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the inner numeric value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl core::str::FromStr for $name {
            type Err = core::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

define_numeric_id! {
    /// A chat-platform user (Discord snowflake).
    PlatformUserId
}

define_numeric_id! {
    /// A chat-platform channel (Discord snowflake).
    ChannelId
}

define_numeric_id! {
    /// A user account on the panel.
    PanelUserId
}

define_numeric_id! {
    /// A server on the panel, addressed by its numeric application-API id.
    ServerId
}

/// Unique identifier for one [`ActionRequest`](crate::ActionRequest).
///
/// Uses UUID v7 so identifiers sort by submission time in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }

    /// The `external_id` tag attached to servers created for this request.
    ///
    /// The panel indexes servers by external id, which lets a retried
    /// create find the server an earlier attempt already provisioned.
    pub fn external_id(self) -> String {
        format!("pterobot-{}", self.0.simple())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_serialize_transparently() {
        let id = PlatformUserId(311_234_567_890_123_456);
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "311234567890123456");
    }

    #[test]
    fn numeric_ids_parse_with_whitespace() {
        let parsed: Result<ServerId, _> = " 42 ".parse();
        assert_eq!(parsed.ok(), Some(ServerId(42)));
        assert!("abc".parse::<ChannelId>().is_err());
    }

    #[test]
    fn external_id_is_stable_per_request() {
        let id = RequestId::new();
        assert_eq!(id.external_id(), id.external_id());
        assert!(id.external_id().starts_with("pterobot-"));
        assert_ne!(id.external_id(), RequestId::new().external_id());
    }
}
