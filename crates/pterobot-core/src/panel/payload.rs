//! Request payload construction and response parsing for the panel API.
//!
//! The client in [`super`] is the only caller; nothing else in the crate
//! knows what the panel's JSON looks like.

use pterobot_types::{
    CreateSpec, LifecycleState, ManagedResource, PanelApiError, PanelUserId, ResourceLimits,
    ServerId,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::{CreateConfig, FeatureLimits};

/// Maximum length the panel accepts for names.
const MAX_NAME_LEN: usize = 191;

// ---------------------------------------------------------------------------
// Create payload strategy
// ---------------------------------------------------------------------------

/// Builds the body of `POST /servers`.
///
/// Create payloads differ between panel versions and deployments (most
/// notably in how the primary allocation is chosen), so the shape is
/// pluggable. The returned body must carry `external_id`, which the client
/// uses to find a server an earlier attempt already provisioned.
pub trait CreatePayloadStrategy: Send + Sync + core::fmt::Debug {
    /// Build the request body, or reject the request before any call.
    fn build(
        &self,
        spec: &CreateSpec,
        owner: PanelUserId,
        external_id: &str,
    ) -> Result<Value, PanelApiError>;
}

/// Payload for the stock Pterodactyl 1.x application API.
///
/// Uses the request's allocation id when present; otherwise lets the panel
/// pick a free allocation in one of the configured deploy locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardCreatePayload {
    /// Locations the panel may auto-deploy into.
    pub deploy_locations: Vec<u64>,
    /// Feature limits granted to new servers.
    pub feature_limits: FeatureLimits,
}

impl StandardCreatePayload {
    /// Build the strategy from configuration.
    pub fn from_config(config: &CreateConfig) -> Self {
        Self {
            deploy_locations: config.deploy_locations.clone(),
            feature_limits: config.feature_limits,
        }
    }
}

impl CreatePayloadStrategy for StandardCreatePayload {
    fn build(
        &self,
        spec: &CreateSpec,
        owner: PanelUserId,
        external_id: &str,
    ) -> Result<Value, PanelApiError> {
        let mut body = json!({
            "name": truncate_chars(&spec.name, MAX_NAME_LEN),
            "user": owner.get(),
            "egg": spec.egg_id,
            "node": spec.node_id,
            "docker_image": spec.docker_image,
            "startup": spec.startup,
            "environment": spec.environment,
            "limits": limits_json(&spec.limits),
            "feature_limits": self.feature_limits,
            "external_id": external_id,
            "start_on_completion": false,
        });

        let placement = if let Some(allocation) = spec.allocation_id {
            ("allocation", json!({ "default": allocation }))
        } else if !self.deploy_locations.is_empty() {
            (
                "deploy",
                json!({
                    "locations": self.deploy_locations,
                    "dedicated_ip": false,
                    "port_range": [],
                }),
            )
        } else {
            return Err(PanelApiError::invalid(
                "create needs an allocation id (no deploy locations are configured)",
            ));
        };

        if let Some(map) = body.as_object_mut() {
            map.insert(placement.0.to_owned(), placement.1);
        }
        Ok(body)
    }
}

/// Body of `PATCH /servers/{id}/build`.
///
/// The panel requires the primary allocation and the feature limits on
/// every build update, so both are carried over from the current server.
pub fn build_update_json(
    limits: &ResourceLimits,
    allocation: u64,
    feature_limits: FeatureLimits,
) -> Value {
    let mut body = limits_json(limits);
    if let Some(map) = body.as_object_mut() {
        map.insert("allocation".to_owned(), json!(allocation));
        map.insert("feature_limits".to_owned(), json!(feature_limits));
    }
    body
}

/// Body of `POST /users` for an auto-provisioned account.
pub fn new_user_json(username: &str, email: &str, display_name: &str) -> Value {
    json!({
        "username": username,
        "email": email,
        "first_name": truncate_chars(display_name, 50),
        "last_name": "Discord",
    })
}

/// Panel-safe username derived from a display name and platform id.
///
/// The panel only accepts lowercase alphanumerics plus `_`, `.` and `-`,
/// and the name must start and end with an alphanumeric character.
pub fn panel_username(display_name: &str, platform_id: u64) -> String {
    let cleaned: String = display_name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let prefix = if cleaned.is_empty() { "discord" } else { cleaned };
    let suffix = format!("-{platform_id}");
    let room = MAX_NAME_LEN.saturating_sub(suffix.len());
    format!("{}{suffix}", truncate_chars(prefix, room))
}

fn limits_json(limits: &ResourceLimits) -> Value {
    json!({
        "memory": limits.memory_mb,
        "swap": limits.swap_mb,
        "disk": limits.disk_mb,
        "io": limits.io_weight,
        "cpu": limits.cpu_percent,
    })
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s.get(..idx).unwrap_or(s),
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Server attributes as returned under `attributes` by the panel.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerAttributes {
    /// Numeric id.
    pub id: u64,
    /// Short identifier.
    #[serde(default)]
    pub identifier: String,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Owner account id.
    #[serde(default)]
    pub user: u64,
    /// Pre-1.8 suspension flag.
    #[serde(default)]
    pub suspended: Option<bool>,
    /// 1.8+ status string (`suspended`, `installing`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Build limits.
    #[serde(default)]
    pub limits: RawLimits,
    /// Feature limits.
    #[serde(default)]
    pub feature_limits: FeatureLimits,
    /// Primary allocation id.
    #[serde(default)]
    pub allocation: Option<u64>,
}

/// Build limits as the panel reports them (swap may be `-1`).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawLimits {
    /// Memory in MB.
    #[serde(default)]
    pub memory: i64,
    /// Swap in MB, `-1` for unlimited.
    #[serde(default)]
    pub swap: i64,
    /// Disk in MB.
    #[serde(default)]
    pub disk: i64,
    /// IO weight.
    #[serde(default)]
    pub io: i64,
    /// CPU percent.
    #[serde(default)]
    pub cpu: i64,
}

impl ServerAttributes {
    /// Parse the `attributes` object of a panel response body.
    pub fn from_body(body: &Value) -> Option<Self> {
        let attributes = body.get("attributes").unwrap_or(body);
        serde_json::from_value(attributes.clone()).ok()
    }

    /// Lifecycle state, accepting both the flag and the status field.
    pub fn state(&self) -> LifecycleState {
        let suspended = self.suspended.unwrap_or(false)
            || self.status.as_deref() == Some("suspended");
        if suspended {
            LifecycleState::Suspended
        } else {
            LifecycleState::Active
        }
    }

    /// Build limits in this crate's representation.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            memory_mb: clamp_u32(self.limits.memory),
            cpu_percent: clamp_u32(self.limits.cpu),
            disk_mb: clamp_u32(self.limits.disk),
            swap_mb: clamp_u32(self.limits.swap),
            io_weight: clamp_u32(self.limits.io),
        }
    }

    /// Transient resource view.
    pub fn to_resource(&self) -> ManagedResource {
        ManagedResource {
            id: ServerId(self.id),
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            owner: PanelUserId(self.user),
            state: self.state(),
            limits: self.limits(),
            allocation_id: self.allocation,
        }
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// First user account in a list response (`data[0].attributes`).
pub fn first_user(body: &Value) -> Option<(PanelUserId, String)> {
    let attributes = body.get("data")?.get(0)?.get("attributes")?;
    let id = attributes.get("id").and_then(Value::as_u64)?;
    let username = attributes
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Some((PanelUserId(id), username))
}

/// Single user account in an object response (`attributes`).
pub fn single_user(body: &Value) -> Option<(PanelUserId, String)> {
    let attributes = body.get("attributes").unwrap_or(body);
    let id = attributes.get("id").and_then(Value::as_u64)?;
    let username = attributes
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Some((PanelUserId(id), username))
}
