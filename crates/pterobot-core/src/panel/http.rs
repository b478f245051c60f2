//! `reqwest` transport for the panel application API.

use std::time::Duration;

use serde_json::Value;

use super::{Method, PanelCall, PanelResponse, PanelTransport};
use crate::error::TransportError;
use crate::secret::Secret;

/// Sends panel calls over HTTPS with an application API key.
///
/// Requests go to `{base_url}/api/application/{path}`.
#[derive(Debug, Clone)]
pub struct HttpPanelTransport {
    client: reqwest::Client,
    api_root: String,
    api_key: Secret,
}

impl HttpPanelTransport {
    /// Create a transport for the panel at `base_url`.
    pub fn new(base_url: &str, api_key: Secret) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_root: format!("{}/api/application", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }
}

impl PanelTransport for HttpPanelTransport {
    async fn send(&self, call: &PanelCall) -> Result<PanelResponse, TransportError> {
        let url = self.url(&call.path);
        let mut request = match call.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        }
        .bearer_auth(self.api_key.expose())
        .header("Accept", "application/json");

        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(PanelResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
fn parse_retry_after(raw: &str) -> Option<Duration> {
    let seconds: f64 = raw.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_under_application_root() {
        let transport = HttpPanelTransport::new("https://panel.test/", Secret::new("ptla_x"));
        assert_eq!(
            transport.url("servers/5/suspend"),
            "https://panel.test/api/application/servers/5/suspend"
        );
        assert_eq!(
            transport.url("/users"),
            "https://panel.test/api/application/users"
        );
    }

    #[test]
    fn retry_after_accepts_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 0.5 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn debug_output_hides_the_key() {
        let transport = HttpPanelTransport::new("https://panel.test", Secret::new("ptla_secret"));
        assert!(!format!("{transport:?}").contains("ptla_secret"));
    }
}
