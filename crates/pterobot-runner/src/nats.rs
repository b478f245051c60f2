//! NATS request/reply front end.
//!
//! The command layer publishes a JSON [`ActionRequest`] on the request
//! subject with a reply inbox. Each message is handled in its own task and
//! answered with exactly one [`ActionReply`]:
//!
//! - `recorded` -- the action ran; the record (and a warning when the
//!   outcome could not be communicated) is attached.
//! - `denied` -- the initiator is not an admin; nothing was executed.
//! - `malformed` -- the payload was not a valid request.
//!
//! On shutdown the service stops taking new requests and gives the ones in
//! flight [`SHUTDOWN_GRACE`] to finish and reply before the connection is
//! flushed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pterobot_core::{ActionOrchestrator, ChatGateway, PanelTransport};
use pterobot_types::{ActionReply, ActionRequest};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::error::RunnerError;

/// How long in-flight requests may run after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Decode a request payload, or the reply explaining why it is unusable.
pub fn decode_request(payload: &[u8]) -> Result<ActionRequest, ActionReply> {
    serde_json::from_slice(payload).map_err(|e| ActionReply::Malformed {
        detail: e.to_string(),
    })
}

/// Run a decoded request through the pipeline and build its reply.
pub async fn handle<T, G>(orchestrator: &ActionOrchestrator<T, G>, payload: &[u8]) -> ActionReply
where
    T: PanelTransport,
    G: ChatGateway,
{
    let request = match decode_request(payload) {
        Ok(request) => request,
        Err(reply) => {
            warn!(payload_size = payload.len(), "malformed action request");
            return reply;
        }
    };
    match orchestrator.run(request).await {
        Ok(record) => ActionReply::recorded(record),
        Err(denied) => ActionReply::Denied {
            initiator: denied.principal,
        },
    }
}

/// NATS connection serving action requests.
pub struct NatsService {
    client: async_nats::Client,
    subject: String,
}

impl NatsService {
    /// Connect to the NATS server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str, subject: &str) -> Result<Self, RunnerError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| RunnerError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self {
            client,
            subject: subject.to_owned(),
        })
    }

    /// Serve requests until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the subscription or the signal handler
    /// cannot be set up.
    pub async fn serve<T, G>(
        self,
        orchestrator: Arc<ActionOrchestrator<T, G>>,
    ) -> Result<(), RunnerError>
    where
        T: PanelTransport + 'static,
        G: ChatGateway + 'static,
    {
        let mut subscriber = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| {
                RunnerError::Nats(format!("failed to subscribe to {}: {e}", self.subject))
            })?;
        info!(subject = self.subject, "listening for action requests");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    signal?;
                    info!("shutdown requested");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    report_join(joined);
                }
                next = subscriber.next() => {
                    let Some(message) = next else {
                        warn!("subscription closed by server");
                        break;
                    };
                    let Some(reply_to) = message.reply.clone() else {
                        warn!(subject = %message.subject, "request without reply subject ignored");
                        continue;
                    };
                    let client = self.client.clone();
                    let orchestrator = Arc::clone(&orchestrator);
                    tasks.spawn(async move {
                        let reply = handle(&orchestrator, &message.payload).await;
                        respond(&client, reply_to, &reply).await;
                    });
                }
            }
        }

        if let Err(e) = subscriber.unsubscribe().await {
            warn!(error = %e, "failed to unsubscribe");
        }
        drain(&mut tasks, SHUTDOWN_GRACE).await;
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "failed to flush NATS connection");
        }
        Ok(())
    }
}

/// Wait up to `grace` for in-flight requests, then abort the rest.
///
/// Returns how many requests were abandoned without a reply.
async fn drain(tasks: &mut JoinSet<()>, grace: Duration) -> usize {
    if tasks.is_empty() {
        return 0;
    }
    info!(in_flight = tasks.len(), "waiting for in-flight requests");
    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            report_join(joined);
        }
    })
    .await;
    if finished.is_ok() {
        return 0;
    }

    let abandoned = tasks.len();
    warn!(
        abandoned,
        grace_secs = grace.as_secs(),
        "shutdown grace period elapsed, aborting requests"
    );
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    abandoned
}

fn report_join(joined: Result<(), JoinError>) {
    match joined {
        Err(e) if e.is_panic() => warn!(error = %e, "request handler panicked"),
        _ => {}
    }
}

async fn respond(client: &async_nats::Client, subject: async_nats::Subject, reply: &ActionReply) {
    let payload = match serde_json::to_vec(reply) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "failed to serialize reply");
            return;
        }
    };
    debug!(subject = %subject, payload_size = payload.len(), "sending reply");
    if let Err(e) = client.publish(subject.clone(), payload.into()).await {
        warn!(subject = %subject, error = %e, "failed to publish reply");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use pterobot_core::{
        CallLimiter, DeliveryError, NotificationRouter, OutboundMessage, PanelActionClient,
        PanelCall, PanelResponse, PermissionGate, RetryPolicy, TransportError,
    };
    use pterobot_types::{ActionKind, AdminPrincipal, ChannelId, PlatformUserId, ServerId};

    use super::*;

    /// Panel that accepts every call.
    struct AcceptingPanel;

    impl PanelTransport for AcceptingPanel {
        async fn send(&self, _call: &PanelCall) -> Result<PanelResponse, TransportError> {
            Ok(PanelResponse {
                status: 204,
                body: serde_json::Value::Null,
                retry_after: None,
            })
        }
    }

    /// Chat platform that either delivers everything or nothing.
    struct Chat {
        reachable: bool,
    }

    impl Chat {
        fn outcome(&self) -> Result<(), DeliveryError> {
            if self.reachable {
                return Ok(());
            }
            Err(DeliveryError::Rejected {
                status: 403,
                detail: "Cannot send messages to this user".to_owned(),
            })
        }
    }

    impl ChatGateway for Chat {
        async fn send_direct(
            &self,
            _user: PlatformUserId,
            _message: &OutboundMessage,
        ) -> Result<(), DeliveryError> {
            self.outcome()
        }

        async fn post_to_channel(
            &self,
            _channel: ChannelId,
            _message: &OutboundMessage,
        ) -> Result<(), DeliveryError> {
            self.outcome()
        }
    }

    fn orchestrator(reachable: bool) -> ActionOrchestrator<AcceptingPanel, Chat> {
        ActionOrchestrator::new(
            PermissionGate::new(BTreeSet::from([PlatformUserId(1)])),
            PanelActionClient::new(
                AcceptingPanel,
                CallLimiter::new(5),
                RetryPolicy::default(),
                Duration::from_secs(1),
            ),
            NotificationRouter::new(Chat { reachable }, ChannelId(9), Duration::from_secs(1)),
        )
    }

    fn suspend_payload(initiator: u64) -> Vec<u8> {
        format!(
            r#"{{
                "initiator": {initiator},
                "target": {{"platform_id": 42, "panel_user_id": 10}},
                "parameters": {{"kind": "suspend", "server": 7, "reason": "abuse"}}
            }}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn handle_denies_caller_outside_allow_list() {
        let reply = handle(&orchestrator(true), &suspend_payload(2)).await;
        assert_eq!(
            reply,
            ActionReply::Denied {
                initiator: AdminPrincipal(PlatformUserId(2))
            }
        );
    }

    #[tokio::test]
    async fn handle_records_delivered_action_without_warning() {
        let reply = handle(&orchestrator(true), &suspend_payload(1)).await;
        assert!(matches!(reply, ActionReply::Recorded { .. }), "{reply:?}");
        if let ActionReply::Recorded { record, warning } = &reply {
            assert!(record.execution().is_success());
            assert!(warning.is_none());
        }
        let encoded = serde_json::to_value(&reply).ok();
        assert_eq!(
            encoded
                .as_ref()
                .and_then(|v| v.get("reply"))
                .and_then(serde_json::Value::as_str),
            Some("recorded")
        );
    }

    #[tokio::test]
    async fn handle_warns_when_nobody_could_be_notified() {
        let reply = handle(&orchestrator(false), &suspend_payload(1)).await;
        assert!(matches!(reply, ActionReply::Recorded { warning: Some(_), .. }), "{reply:?}");
        if let ActionReply::Recorded { record, warning } = &reply {
            assert!(record.execution().is_success());
            assert!(record.is_degraded());
            let warning = warning.as_deref().unwrap_or_default();
            assert!(warning.contains("could not be recorded or notified"));
            assert!(warning.contains("Cannot send messages to this user"));
        }
    }

    #[tokio::test]
    async fn handle_answers_garbage_with_malformed() {
        let reply = handle(&orchestrator(true), b"{\"initiator\": 1}").await;
        assert!(matches!(reply, ActionReply::Malformed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_requests_in_flight() {
        let replied = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        let flag = Arc::clone(&replied);
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(drain(&mut tasks, SHUTDOWN_GRACE).await, 0);
        assert!(replied.load(Ordering::SeqCst));
        assert!(tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_requests_past_the_grace_period() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let started = tokio::time::Instant::now();
        assert_eq!(drain(&mut tasks, Duration::from_secs(10)).await, 1);
        assert!(started.elapsed() < Duration::from_secs(3600));
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn drain_with_nothing_in_flight_returns_at_once() {
        let mut tasks = JoinSet::new();
        assert_eq!(drain(&mut tasks, SHUTDOWN_GRACE).await, 0);
    }

    #[test]
    fn decodes_request_with_generated_id() {
        let payload = br#"{
            "initiator": 1,
            "target": {"platform_id": 42},
            "parameters": {"kind": "suspend", "server": 7, "reason": "abuse"}
        }"#;
        let request = decode_request(payload);
        assert!(request.is_ok());
        if let Ok(request) = request {
            assert_eq!(request.kind(), ActionKind::Suspend);
            assert_eq!(request.target.platform_id, PlatformUserId(42));
            assert_eq!(request.parameters.server(), Some(ServerId(7)));
        }
    }

    #[test]
    fn malformed_payload_becomes_malformed_reply() {
        let reply = decode_request(b"{\"initiator\": \"nope\"}");
        assert!(matches!(reply, Err(ActionReply::Malformed { .. })));

        let reply = decode_request(b"not json");
        assert!(matches!(reply, Err(ActionReply::Malformed { .. })));
    }

    #[test]
    fn unknown_action_kind_is_malformed() {
        let payload = br#"{
            "initiator": 1,
            "target": {"platform_id": 42},
            "parameters": {"kind": "reinstall", "server": 7}
        }"#;
        assert!(matches!(
            decode_request(payload),
            Err(ActionReply::Malformed { .. })
        ));
    }
}
