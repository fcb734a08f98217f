use crate::modules::{
    audit::{AuditStore, OutcomeRecord, OutcomeStatus},
    error::PipelineError,
    notification::NotificationSender,
    object_store::{ObjectStore, StoredObject},
    remote_fetch::RemoteFetcher,
    submission_event::{StorageObjectKey, SubmissionEvent},
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

// Stages of a single invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Validating,
    Validated,
    Rejected,
    Stored,
    Notified,
    Recorded,
}

// What one invocation produced
#[derive(Debug)]
pub struct PipelineOutcome {
    pub record: OutcomeRecord,
    // Present only on the success branch
    pub stored: Option<StoredObject>,
    // Whether the transport accepted the email
    pub notified: bool,
    // Whether the audit store accepted the record
    pub recorded: bool,
    // Last state the invocation reached
    pub state: PipelineState,
}

// Sequences validate -> store -> notify -> record for one notification.
// Every invocation that decodes ends with one email attempt and one
// audit write, whichever step failed before.
#[derive(Clone)]
pub struct SubmissionPipeline {
    fetcher: RemoteFetcher,
    object_store: Arc<dyn ObjectStore>,
    notifier: NotificationSender,
    audit_store: Arc<dyn AuditStore>,
}

impl SubmissionPipeline {
    pub fn new(
        fetcher: RemoteFetcher,
        object_store: Arc<dyn ObjectStore>,
        notifier: NotificationSender,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            fetcher,
            object_store,
            notifier,
            audit_store,
        }
    }

    /// Runs one invocation on a raw notification envelope.
    ///
    /// Only `MalformedEvent` is returned as an error; in that case nothing is
    /// emailed or recorded. Notification and persistence failures are logged
    /// and reflected in the returned outcome.
    pub async fn handle(&self, raw_envelope: &str) -> Result<PipelineOutcome, PipelineError> {
        let outcome_id = Uuid::new_v4();
        transition(outcome_id, PipelineState::Received);

        let event = match SubmissionEvent::decode(raw_envelope) {
            Ok(event) => event,
            Err(e) => {
                error!("[{}] Dropping notification: {}", outcome_id, e);
                return Err(e);
            }
        };

        let key = event.storage_key();
        transition(outcome_id, PipelineState::Validating);

        let stored = self.ingest(outcome_id, &event, &key).await;

        let (status, email) = match &stored {
            Ok(stored) => {
                info!(
                    "[{}] Stored {} bytes for {} under {} ({})",
                    outcome_id, stored.bytes_written, event.submitter_email, stored.key, stored.reference
                );
                (OutcomeStatus::Success, self.notifier.success_message(&event, stored))
            }
            Err(e) => {
                warn!("[{}] Submission from {} failed: {}", outcome_id, event.submitter_email, e);
                (OutcomeStatus::Failure, self.notifier.failure_message(&event, e))
            }
        };

        let notified = self.notifier.send_best_effort(&email).await;
        let mut state = transition(outcome_id, PipelineState::Notified);

        let record = OutcomeRecord::new(outcome_id, &email, status);
        let recorded = match self.audit_store.put_record(&record).await {
            Ok(()) => {
                state = transition(outcome_id, PipelineState::Recorded);
                true
            }
            Err(e) => {
                error!("[{}] Error recording outcome: {}", outcome_id, e);
                false
            }
        };

        info!("[{}] Invocation finished with status {}", outcome_id, status);

        Ok(PipelineOutcome {
            record,
            stored: stored.ok(),
            notified,
            recorded,
            state,
        })
    }

    // Fetch, validate and stream into storage
    async fn ingest(
        &self,
        outcome_id: Uuid,
        event: &SubmissionEvent,
        key: &StorageObjectKey,
    ) -> Result<StoredObject, PipelineError> {
        let payload = match self.fetcher.fetch(&event.submission_url).await {
            Ok(payload) => {
                debug!(
                    "[{}] Streaming {} ({:?} bytes declared) to {}",
                    outcome_id, payload.content_type, payload.content_length, key
                );
                transition(outcome_id, PipelineState::Validated);
                payload
            }
            Err(e) => {
                transition(outcome_id, PipelineState::Rejected);
                return Err(e);
            }
        };

        let stored = self
            .object_store
            .put_stream(key, &payload.content_type, payload.stream)
            .await?;
        transition(outcome_id, PipelineState::Stored);
        Ok(stored)
    }
}

fn transition(outcome_id: Uuid, state: PipelineState) -> PipelineState {
    debug!("[{}] -> {:?}", outcome_id, state);
    state
}
