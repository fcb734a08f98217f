// In-memory collaborators for pipeline tests
use crate::modules::{
    audit::{AuditStore, OutcomeRecord},
    error::PipelineError,
    notification::{EmailMessage, NotificationTransport},
    object_store::{ObjectStore, StoredObject},
    remote_fetch::PayloadStream,
    submission_event::{StorageObjectKey, SubmissionEvent},
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_stream::StreamExt;

pub fn sample_event(submission_url: &str) -> SubmissionEvent {
    SubmissionEvent {
        submitter_email: "jane@example.com".into(),
        submission_url: submission_url.into(),
        first_name: "Jane".into(),
        last_name: "Doe".into(),
        assignment_name: "HW1".into(),
        submission_time: "2024-01-02T03:04:05.678Z".into(),
    }
}

// Wraps a submission message into an SNS envelope
pub fn envelope_for(event: &SubmissionEvent) -> String {
    let message = serde_json::to_string(event).unwrap();
    serde_json::json!({ "Records": [{ "Sns": { "Message": message } }] }).to_string()
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredBlob>>,
    writes: RwLock<usize>,
    // Fail after the first chunk has been consumed
    fail_writes: bool,
}

impl MemoryObjectStore {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub async fn object(&self, key: &str) -> Option<StoredBlob> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn writes(&self) -> usize {
        *self.writes.read().await
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_stream(
        &self,
        key: &StorageObjectKey,
        content_type: &str,
        mut body: PayloadStream,
    ) -> Result<StoredObject, PipelineError> {
        *self.writes.write().await += 1;

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| PipelineError::UploadFailed(e.to_string()))?;
            data.extend_from_slice(&chunk);
            if self.fail_writes {
                return Err(PipelineError::UploadFailed("simulated storage outage".into()));
            }
        }

        let bytes_written = data.len() as u64;
        self.objects.write().await.insert(
            key.to_string(),
            StoredBlob {
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(StoredObject {
            key: key.clone(),
            reference: format!("memory://submissions/{}", key),
            bytes_written,
        })
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: RwLock<Vec<EmailMessage>>,
    attempts: RwLock<usize>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.read().await.clone()
    }

    pub async fn attempts(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), PipelineError> {
        *self.attempts.write().await += 1;
        if self.fail {
            return Err(PipelineError::NotificationFailed("simulated transport outage".into()));
        }
        self.sent.write().await.push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<OutcomeRecord>>,
    attempts: RwLock<usize>,
    fail: bool,
}

impl MemoryAuditStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn records(&self) -> Vec<OutcomeRecord> {
        self.records.read().await.clone()
    }

    pub async fn attempts(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn put_record(&self, record: &OutcomeRecord) -> Result<(), PipelineError> {
        *self.attempts.write().await += 1;
        if self.fail {
            return Err(PipelineError::PersistenceFailed("simulated table outage".into()));
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
