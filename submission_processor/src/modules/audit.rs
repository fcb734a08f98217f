use crate::modules::{error::PipelineError, notification::EmailMessage};
use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoClient};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => f.write_str("success"),
            OutcomeStatus::Failure => f.write_str("failure"),
        }
    }
}

// Audit record of a single invocation, written exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    // Fresh for every invocation, never reused
    pub id: Uuid,
    pub sender_email: String,
    // Always the submitter's address
    pub receiver_email: String,
    pub subject: String,
    pub body: String,
    pub status: OutcomeStatus,
    pub created_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn new(id: Uuid, email: &EmailMessage, status: OutcomeStatus) -> Self {
        Self {
            id,
            sender_email: email.from.clone(),
            receiver_email: email.to.clone(),
            subject: email.subject.clone(),
            body: email.text.clone(),
            status,
            created_at: Utc::now(),
        }
    }

    // DynamoDB item, every attribute stored as a string
    pub fn to_item(&self) -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("id".to_string(), AttributeValue::S(self.id.to_string())),
            ("senderEmail".to_string(), AttributeValue::S(self.sender_email.clone())),
            ("receiverEmail".to_string(), AttributeValue::S(self.receiver_email.clone())),
            ("subject".to_string(), AttributeValue::S(self.subject.clone())),
            ("body".to_string(), AttributeValue::S(self.body.clone())),
            ("status".to_string(), AttributeValue::S(self.status.to_string())),
            (
                "createdAt".to_string(),
                AttributeValue::S(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
        ])
    }
}

// Durable key-value store for outcome records, keyed by record id
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn put_record(&self, record: &OutcomeRecord) -> Result<(), PipelineError>;
}

#[derive(Clone)]
pub struct DynamoAuditStore {
    dynamo_client: DynamoClient,
    table_name: String,
}

impl DynamoAuditStore {
    pub fn new(dynamo_client: DynamoClient, table_name: String) -> Self {
        Self {
            dynamo_client,
            table_name,
        }
    }
}

#[async_trait]
impl AuditStore for DynamoAuditStore {
    async fn put_record(&self, record: &OutcomeRecord) -> Result<(), PipelineError> {
        self.dynamo_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record.to_item()))
            .send()
            .await
            .map_err(|e| PipelineError::PersistenceFailed(e.to_string()))?;
        Ok(())
    }
}
