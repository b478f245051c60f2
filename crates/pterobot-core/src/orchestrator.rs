//! Action orchestrator.
//!
//! Drives one request through the pipeline:
//!
//! ```text
//! Received -> gate -> Denied                                   (terminal)
//!                  -> Authorized -> execute -> notify -> Recorded (terminal)
//! ```
//!
//! Notification runs whether or not execution succeeded. A denied request
//! never reaches the panel or the audit channel.

use pterobot_types::{ActionRecord, ActionRequest};

use crate::error::PermissionDenied;
use crate::journal::RecordJournal;
use crate::notify::{ChatGateway, NotificationRouter};
use crate::panel::{PanelActionClient, PanelTransport};
use crate::permission::PermissionGate;

/// Runs authorized actions end to end.
#[derive(Debug)]
pub struct ActionOrchestrator<T, G> {
    gate: PermissionGate,
    client: PanelActionClient<T>,
    router: NotificationRouter<G>,
    journal: Option<RecordJournal>,
}

impl<T: PanelTransport, G: ChatGateway> ActionOrchestrator<T, G> {
    /// Assemble an orchestrator without a journal.
    pub const fn new(
        gate: PermissionGate,
        client: PanelActionClient<T>,
        router: NotificationRouter<G>,
    ) -> Self {
        Self {
            gate,
            client,
            router,
            journal: None,
        }
    }

    /// Also append every record to `journal`.
    #[must_use]
    pub fn with_journal(mut self, journal: RecordJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The panel client, for callers that need read-only panel access.
    pub const fn client(&self) -> &PanelActionClient<T> {
        &self.client
    }

    /// Run one request.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionDenied`] when the initiator is not an admin. In
    /// that case no panel call and no notification happened. Every other
    /// path yields a complete record, including failed actions and failed
    /// notifications.
    pub async fn run(&self, request: ActionRequest) -> Result<ActionRecord, PermissionDenied> {
        if !self.gate.authorize(request.initiator) {
            tracing::warn!(
                request_id = %request.id,
                initiator = %request.initiator,
                kind = request.kind().as_str(),
                "permission denied"
            );
            return Err(PermissionDenied {
                principal: request.initiator,
            });
        }

        tracing::info!(
            request_id = %request.id,
            initiator = %request.initiator,
            target = %request.target.platform_id,
            kind = request.kind().as_str(),
            "executing action"
        );

        let execution = self.client.execute(&request).await;
        let notification = self.router.notify(&request, &execution).await;
        let record = ActionRecord::new(request, execution, notification);

        if let Some(warning) = record.warning() {
            tracing::error!(request_id = %record.request().id, "{warning}");
        }
        tracing::info!(
            request_id = %record.request().id,
            success = record.execution().is_success(),
            notification = record.notification().as_str(),
            "action recorded"
        );

        if let Some(journal) = &self.journal {
            if let Err(error) = journal.append(&record).await {
                tracing::error!(
                    request_id = %record.request().id,
                    path = %journal.path().display(),
                    error = %error,
                    "failed to append record to journal"
                );
            }
        }

        Ok(record)
    }
}
