//! Panel action client.
//!
//! Translates an [`ActionRequest`] into calls against the panel's
//! application API and turns whatever happens into an
//! [`ExecutionOutcome`]. Transport errors never escape: timeouts, 5xx and
//! 429 are retried with backoff inside [`PanelActionClient::execute`], and
//! everything else becomes a typed [`PanelApiError`].
//!
//! # Idempotency
//!
//! - **Delete** -- a 404 means an earlier attempt (or another admin) already
//!   deleted the server and counts as success.
//! - **Suspend / Unsuspend** -- a 409 or 422 triggers a re-read; if the
//!   server is already in the target state the action succeeds with
//!   `already_in_state` set.
//! - **UpdateResources** -- reads the current build first and skips the
//!   write when the limits already match.
//! - **Create** -- every request carries a stable `external_id`. After any
//!   failed attempt the client looks the server up by that id before
//!   sending the create again, so a retry never provisions a duplicate.
//!   The target node is read first; an unknown node fails before anything
//!   is written.
//! - **Panel accounts** -- looked up by their synthetic email, both before
//!   creating one and again after a failed or conflicting create.

mod http;
mod payload;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pterobot_types::{
    ActionParameters, ActionRequest, CreateSpec, ExecutionOutcome, LifecycleState,
    ManagedResource, PanelApiError, PanelUserId, PlatformUserId, ResourceLimits,
    ResultingState, ServerId, TargetUser,
};
use serde_json::Value;

pub use http::HttpPanelTransport;
pub use payload::{CreatePayloadStrategy, StandardCreatePayload};

use crate::config::PanelConfig;
use crate::error::TransportError;
use crate::limiter::CallLimiter;
use crate::retry::{Attempt, RetryPolicy};
use payload::ServerAttributes;

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// HTTP method of a panel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// One request against the application API, relative to its root.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelCall {
    /// HTTP method.
    pub method: Method,
    /// Path below `/api/application`, without a leading slash.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

impl PanelCall {
    /// `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    /// `POST path` with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    /// `PATCH path` with a JSON body.
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path, Some(body))
    }

    /// `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }
}

/// A response from the panel, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, `Null` when empty or not JSON.
    pub body: Value,
    /// Parsed `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl PanelResponse {
    /// Whether the status is 2xx.
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Human-readable error text from a panel error body.
    ///
    /// The panel answers errors with `{"errors": [{"code", "status",
    /// "detail"}]}`; the details are joined. Anything else falls back to
    /// the raw body.
    pub fn error_detail(&self) -> String {
        let details: Vec<&str> = self
            .body
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("detail").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        if !details.is_empty() {
            return details.join("; ");
        }
        match &self.body {
            Value::Null => format!("HTTP {}", self.status),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    fn rejected(&self) -> PanelApiError {
        PanelApiError::Rejected {
            status: Some(self.status),
            detail: self.error_detail(),
        }
    }
}

/// Sends a single HTTP attempt to the panel.
///
/// Implementations do not retry, throttle or time out; the client does
/// all three around every call.
pub trait PanelTransport: Send + Sync {
    /// Perform one attempt.
    fn send(
        &self,
        call: &PanelCall,
    ) -> impl Future<Output = Result<PanelResponse, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A panel account resolved or created for a platform user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelAccount {
    /// Panel user id.
    pub id: PanelUserId,
    /// Panel username.
    pub username: String,
    /// Whether the account was created by this call.
    pub created: bool,
}

/// Executes privileged actions against the panel.
#[derive(Debug)]
pub struct PanelActionClient<T> {
    transport: T,
    limiter: CallLimiter,
    policy: RetryPolicy,
    call_timeout: Duration,
    create_payload: Arc<dyn CreatePayloadStrategy>,
    email_domain: String,
}

impl<T: PanelTransport> PanelActionClient<T> {
    /// Create a client with explicit retry, limiter and timeout settings.
    pub fn new(
        transport: T,
        limiter: CallLimiter,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
            call_timeout,
            create_payload: Arc::new(StandardCreatePayload::default()),
            email_domain: "local".to_owned(),
        }
    }

    /// Create a client from configuration with its own limiter.
    pub fn from_config(transport: T, config: &PanelConfig) -> Self {
        Self::new(
            transport,
            CallLimiter::new(config.max_concurrent_calls),
            RetryPolicy::from_config(&config.retry),
            config.request_timeout(),
        )
        .with_create_payload(Arc::new(StandardCreatePayload::from_config(&config.create)))
        .with_email_domain(&config.user_email_domain)
    }

    /// Replace the create payload strategy.
    #[must_use]
    pub fn with_create_payload(mut self, strategy: Arc<dyn CreatePayloadStrategy>) -> Self {
        self.create_payload = strategy;
        self
    }

    /// Domain used for auto-provisioned account emails.
    #[must_use]
    pub fn with_email_domain(mut self, domain: &str) -> Self {
        domain.clone_into(&mut self.email_domain);
        self
    }

    /// The limiter shared by every call from this client.
    pub const fn limiter(&self) -> &CallLimiter {
        &self.limiter
    }

    /// Execute a request's action and report what happened.
    ///
    /// Never returns early with a transport error; the outcome always
    /// states either the resulting server state or why the action failed.
    pub async fn execute(&self, request: &ActionRequest) -> ExecutionOutcome {
        let result = match &request.parameters {
            ActionParameters::Create(spec) => self.create(request, spec).await,
            ActionParameters::Delete { server } => self.delete(*server).await,
            ActionParameters::Suspend { server, .. } => {
                self.set_suspended(*server, LifecycleState::Suspended).await
            }
            ActionParameters::Unsuspend { server, .. } => {
                self.set_suspended(*server, LifecycleState::Active).await
            }
            ActionParameters::UpdateResources { server, limits } => {
                self.update_resources(*server, limits).await
            }
        };

        match result {
            Ok(state) => {
                tracing::info!(
                    request_id = %request.id,
                    kind = request.kind().as_str(),
                    server = %state.server,
                    state = state.state.as_str(),
                    already_in_state = state.already_in_state,
                    "panel action succeeded"
                );
                ExecutionOutcome::Success(state)
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %request.id,
                    kind = request.kind().as_str(),
                    error = %error,
                    "panel action failed"
                );
                ExecutionOutcome::Failed(error)
            }
        }
    }

    /// Read a server's current state, `None` if it does not exist.
    pub async fn fetch_resource(
        &self,
        server: ServerId,
    ) -> Result<Option<ManagedResource>, PanelApiError> {
        Ok(self
            .fetch_attributes(server)
            .await?
            .map(|attributes| attributes.to_resource()))
    }

    /// Find the panel account for a platform user, creating it if needed.
    ///
    /// Accounts are keyed by a synthetic email derived from the platform id,
    /// so repeated calls resolve to the same account. A failed or
    /// conflicting account create is followed by another lookup, so an
    /// account made by an attempt whose response was lost is reused rather
    /// than reported as an error.
    pub async fn ensure_panel_user(
        &self,
        platform_id: PlatformUserId,
        display_name: Option<&str>,
    ) -> Result<PanelAccount, PanelApiError> {
        let email = format!("discord-{platform_id}@{}", self.email_domain);
        if let Some(account) = self.find_user(platform_id, &email).await? {
            return Ok(account);
        }

        let display_name = display_name.unwrap_or("discord");
        let username = payload::panel_username(display_name, platform_id.get());
        let create = PanelCall::post(
            "users",
            payload::new_user_json(&username, &email, display_name),
        );

        let mut budget = self.policy.budget();
        loop {
            match self.attempt(&create).await {
                Attempt::Response(response) if response.is_success() => {
                    let (id, username) = payload::single_user(&response.body).ok_or_else(|| {
                        PanelApiError::Rejected {
                            status: Some(response.status),
                            detail: "panel did not return the new account".to_owned(),
                        }
                    })?;
                    tracing::info!(
                        %platform_id,
                        panel_user = %id,
                        %username,
                        "created panel account"
                    );
                    return Ok(PanelAccount {
                        id,
                        username,
                        created: true,
                    });
                }
                Attempt::Response(response) => {
                    // The email is unique on the panel; a conflict means the account exists.
                    if matches!(response.status, 409 | 422) {
                        if let Some(account) = self.find_user(platform_id, &email).await? {
                            return Ok(account);
                        }
                    }
                    return Err(response.rejected());
                }
                Attempt::RateLimited { retry_after } => {
                    let delay = budget.on_rate_limited(retry_after)?;
                    self.pause(&create, delay).await;
                }
                Attempt::Transient { detail } => match budget.on_transient(&detail) {
                    Ok(delay) => {
                        self.pause(&create, delay).await;
                        if let Some(account) = self.find_user(platform_id, &email).await? {
                            return Ok(account);
                        }
                    }
                    Err(exhausted) => {
                        if let Ok(Some(account)) = self.find_user(platform_id, &email).await {
                            return Ok(account);
                        }
                        return Err(exhausted);
                    }
                },
            }
        }
    }

    /// Look up the account registered under `email`.
    async fn find_user(
        &self,
        platform_id: PlatformUserId,
        email: &str,
    ) -> Result<Option<PanelAccount>, PanelApiError> {
        let lookup = PanelCall::get("users").with_query("filter[email]", email);
        let response = self.send_with_retry(&lookup).await?;
        if !response.is_success() {
            return Err(response.rejected());
        }
        Ok(payload::first_user(&response.body).map(|(id, username)| {
            tracing::debug!(%platform_id, panel_user = %id, "resolved existing panel account");
            PanelAccount {
                id,
                username,
                created: false,
            }
        }))
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    async fn create(
        &self,
        request: &ActionRequest,
        spec: &CreateSpec,
    ) -> Result<ResultingState, PanelApiError> {
        spec.limits
            .validate()
            .map_err(|e| PanelApiError::invalid(e.to_string()))?;
        let owner = self.resolve_owner(&request.target).await?;
        let external_id = request.id.external_id();
        let body = self.create_payload.build(spec, owner, &external_id)?;
        self.check_node(spec.node_id).await?;
        let call = PanelCall::post("servers", body);

        let mut budget = self.policy.budget();
        loop {
            match self.attempt(&call).await {
                Attempt::Response(response) if response.is_success() => {
                    if let Some(attributes) = ServerAttributes::from_body(&response.body) {
                        return Ok(created(&attributes, false));
                    }
                    return self
                        .find_created(&external_id)
                        .await?
                        .ok_or_else(|| PanelApiError::Rejected {
                            status: Some(response.status),
                            detail: "panel did not return the new server".to_owned(),
                        });
                }
                Attempt::Response(response) => {
                    // A conflict after a lost response means the server exists.
                    if budget.failures() > 0 && matches!(response.status, 409 | 422) {
                        if let Some(state) = self.find_created(&external_id).await? {
                            return Ok(state);
                        }
                    }
                    return Err(response.rejected());
                }
                Attempt::RateLimited { retry_after } => {
                    let delay = budget.on_rate_limited(retry_after)?;
                    self.pause(&call, delay).await;
                }
                Attempt::Transient { detail } => match budget.on_transient(&detail) {
                    Ok(delay) => {
                        self.pause(&call, delay).await;
                        if let Some(state) = self.find_created(&external_id).await? {
                            return Ok(state);
                        }
                    }
                    Err(exhausted) => {
                        if let Ok(Some(state)) = self.find_created(&external_id).await {
                            return Ok(state);
                        }
                        return Err(exhausted);
                    }
                },
            }
        }
    }

    async fn resolve_owner(&self, target: &TargetUser) -> Result<PanelUserId, PanelApiError> {
        if let Some(id) = target.panel_user_id {
            return Ok(id);
        }
        let account = self
            .ensure_panel_user(target.platform_id, target.display_name.as_deref())
            .await?;
        Ok(account.id)
    }

    /// Fail early with a readable error when the target node is unknown.
    async fn check_node(&self, node: u64) -> Result<(), PanelApiError> {
        let response = self
            .send_with_retry(&PanelCall::get(format!("nodes/{node}")))
            .await?;
        match response.status {
            404 => Err(PanelApiError::Rejected {
                status: Some(404),
                detail: format!("node {node} does not exist"),
            }),
            _ if response.is_success() => Ok(()),
            _ => Err(response.rejected()),
        }
    }

    /// Look up a server by the external id of the request that created it.
    async fn find_created(
        &self,
        external_id: &str,
    ) -> Result<Option<ResultingState>, PanelApiError> {
        let call = PanelCall::get(format!("servers/external/{external_id}"));
        let response = self.send_with_retry(&call).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.rejected());
        }
        let found = ServerAttributes::from_body(&response.body);
        if let Some(attributes) = &found {
            tracing::info!(
                external_id,
                server = attributes.id,
                "create already applied by an earlier attempt"
            );
        }
        Ok(found.map(|attributes| created(&attributes, true)))
    }

    async fn delete(&self, server: ServerId) -> Result<ResultingState, PanelApiError> {
        let response = self
            .send_with_retry(&PanelCall::delete(format!("servers/{server}")))
            .await?;
        let already_in_state = match response.status {
            404 => true,
            _ if response.is_success() => false,
            _ => return Err(response.rejected()),
        };
        Ok(ResultingState {
            server,
            state: LifecycleState::Deleted,
            limits: None,
            already_in_state,
        })
    }

    async fn set_suspended(
        &self,
        server: ServerId,
        target: LifecycleState,
    ) -> Result<ResultingState, PanelApiError> {
        let verb = if target == LifecycleState::Suspended {
            "suspend"
        } else {
            "unsuspend"
        };
        let response = self
            .send_with_retry(&PanelCall::post(
                format!("servers/{server}/{verb}"),
                Value::Object(serde_json::Map::new()),
            ))
            .await?;

        if response.is_success() {
            return Ok(ResultingState {
                server,
                state: target,
                limits: None,
                already_in_state: false,
            });
        }
        if matches!(response.status, 409 | 422) {
            if let Some(current) = self.fetch_resource(server).await? {
                if current.state == target {
                    return Ok(ResultingState {
                        server,
                        state: target,
                        limits: Some(current.limits),
                        already_in_state: true,
                    });
                }
            }
        }
        Err(response.rejected())
    }

    async fn update_resources(
        &self,
        server: ServerId,
        limits: &ResourceLimits,
    ) -> Result<ResultingState, PanelApiError> {
        limits
            .validate()
            .map_err(|e| PanelApiError::invalid(e.to_string()))?;
        let current = self
            .fetch_attributes(server)
            .await?
            .ok_or_else(|| PanelApiError::Rejected {
                status: Some(404),
                detail: format!("server {server} does not exist"),
            })?;

        if current.limits() == *limits {
            return Ok(ResultingState {
                server,
                state: current.state(),
                limits: Some(*limits),
                already_in_state: true,
            });
        }

        let allocation = current.allocation.ok_or_else(|| {
            PanelApiError::invalid(format!("server {server} has no primary allocation"))
        })?;
        let body = payload::build_update_json(limits, allocation, current.feature_limits);
        let response = self
            .send_with_retry(&PanelCall::patch(format!("servers/{server}/build"), body))
            .await?;
        if !response.is_success() {
            return Err(response.rejected());
        }

        let updated = ServerAttributes::from_body(&response.body);
        Ok(ResultingState {
            server,
            state: updated.as_ref().map_or_else(|| current.state(), ServerAttributes::state),
            limits: Some(updated.map_or(*limits, |u| u.limits())),
            already_in_state: false,
        })
    }

    async fn fetch_attributes(
        &self,
        server: ServerId,
    ) -> Result<Option<ServerAttributes>, PanelApiError> {
        let response = self
            .send_with_retry(&PanelCall::get(format!("servers/{server}")))
            .await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response.rejected());
        }
        ServerAttributes::from_body(&response.body)
            .map(Some)
            .ok_or_else(|| PanelApiError::Rejected {
                status: Some(response.status),
                detail: format!("unreadable attributes for server {server}"),
            })
    }

    // -----------------------------------------------------------------------
    // Retry loop
    // -----------------------------------------------------------------------

    /// Send a call, retrying rate limits and transient failures.
    ///
    /// Returns the first final response, which may still be a 4xx.
    async fn send_with_retry(&self, call: &PanelCall) -> Result<PanelResponse, PanelApiError> {
        let mut budget = self.policy.budget();
        loop {
            match self.attempt(call).await {
                Attempt::Response(response) => return Ok(response),
                Attempt::RateLimited { retry_after } => {
                    let delay = budget.on_rate_limited(retry_after)?;
                    self.pause(call, delay).await;
                }
                Attempt::Transient { detail } => {
                    let delay = budget.on_transient(&detail)?;
                    self.pause(call, delay).await;
                }
            }
        }
    }

    /// One throttled, time-limited, classified attempt.
    async fn attempt(&self, call: &PanelCall) -> Attempt {
        let Some(_permit) = self.limiter.acquire().await else {
            return Attempt::Transient {
                detail: "call limiter closed".to_owned(),
            };
        };

        tracing::debug!(method = call.method.as_str(), path = %call.path, "panel call");
        match tokio::time::timeout(self.call_timeout, self.transport.send(call)).await {
            Ok(Ok(response)) => Attempt::classify(response),
            Ok(Err(error)) => Attempt::Transient {
                detail: error.to_string(),
            },
            Err(_) => Attempt::Transient {
                detail: TransportError::Timeout {
                    timeout_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                }
                .to_string(),
            },
        }
    }

    async fn pause(&self, call: &PanelCall, delay: Duration) {
        tracing::warn!(
            method = call.method.as_str(),
            path = %call.path,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "panel call failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

fn created(attributes: &ServerAttributes, already_in_state: bool) -> ResultingState {
    ResultingState {
        server: ServerId(attributes.id),
        state: LifecycleState::Active,
        limits: Some(attributes.limits()),
        already_in_state,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_detail_prefers_panel_errors() {
        let response = PanelResponse {
            status: 422,
            body: json!({"errors": [
                {"code": "ValidationException", "status": "422", "detail": "The name field is required."},
                {"code": "ValidationException", "status": "422", "detail": "The egg field is required."}
            ]}),
            retry_after: None,
        };
        assert_eq!(
            response.error_detail(),
            "The name field is required.; The egg field is required."
        );
    }

    #[test]
    fn error_detail_falls_back_to_body_or_status() {
        let text = PanelResponse {
            status: 502,
            body: json!("Bad Gateway"),
            retry_after: None,
        };
        assert_eq!(text.error_detail(), "Bad Gateway");

        let empty = PanelResponse {
            status: 500,
            body: Value::Null,
            retry_after: None,
        };
        assert_eq!(empty.error_detail(), "HTTP 500");
    }

    #[test]
    fn call_builders_set_method_and_query() {
        let call = PanelCall::get("users").with_query("filter[email]", "a@b");
        assert_eq!(call.method, Method::Get);
        assert_eq!(call.query, vec![("filter[email]".to_owned(), "a@b".to_owned())]);
        assert!(call.body.is_none());
        assert_eq!(PanelCall::delete("servers/1").method.as_str(), "DELETE");
    }
}
