use crate::modules::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

// Inbound notification envelope. Two shapes reach the worker:
// - the Lambda style SNS envelope with a list of records
// - a raw SNS notification delivered through an SQS subscription
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Records {
        #[serde(rename = "Records")]
        records: Vec<EnvelopeRecord>,
    },
    Notification {
        #[serde(rename = "Message")]
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct EnvelopeRecord {
    #[serde(rename = "Sns")]
    sns: SnsPayload,
}

#[derive(Debug, Deserialize)]
struct SnsPayload {
    // JSON encoded submission, still a string at this point
    #[serde(rename = "Message")]
    message: String,
}

// A single submission notification, decoded once per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEvent {
    // Address the outcome email is sent to
    #[serde(rename = "userEmail")]
    pub submitter_email: String,

    // Absolute URL of the submitted archive
    pub submission_url: String,

    #[serde(rename = "firstName")]
    pub first_name: String,

    #[serde(rename = "lastName")]
    pub last_name: String,

    #[serde(rename = "assignmentName")]
    pub assignment_name: String,

    // Submission timestamp as sent by the producer, used verbatim for the key
    #[serde(rename = "submissionTime")]
    pub submission_time: String,
}

impl SubmissionEvent {
    /// Decodes a raw notification envelope into a `SubmissionEvent`.
    ///
    /// Only the first record of a multi-record envelope is read; the rest are
    /// ignored.
    pub fn decode(raw: &str) -> Result<Self, PipelineError> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| PipelineError::MalformedEvent(format!("unreadable envelope: {}", e)))?;

        let message = match envelope {
            Envelope::Records { records } => match records.into_iter().next() {
                Some(record) => record.sns.message,
                None => {
                    return Err(PipelineError::MalformedEvent(
                        "envelope contains no records".to_string(),
                    ))
                }
            },
            Envelope::Notification { message } => message,
        };

        let body: serde_json::Value = serde_json::from_str(&message)
            .map_err(|e| PipelineError::MalformedEvent(format!("message is not JSON: {}", e)))?;

        is_valid_submission(&body)?;

        let event: SubmissionEvent = serde_json::from_value(body)
            .map_err(|e| PipelineError::MalformedEvent(e.to_string()))?;

        // Relative URLs fail to parse, so this also enforces absoluteness
        match Url::parse(&event.submission_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(PipelineError::MalformedEvent(format!(
                    "unsupported submission_url scheme: {}",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(PipelineError::MalformedEvent(format!(
                    "submission_url is not an absolute URL: {}",
                    e
                )))
            }
        }

        Ok(event)
    }

    pub fn storage_key(&self) -> StorageObjectKey {
        StorageObjectKey::for_submission(self)
    }
}

// Validates the message body against the required submission shape
fn is_valid_submission(body: &serde_json::Value) -> Result<(), PipelineError> {
    let required_string = serde_json::json!({ "type": "string", "minLength": 1, "pattern": "\\S" });

    let control_schema = serde_json::json!({
        "type": "object",
        "properties": {
            "userEmail": required_string,
            "submission_url": required_string,
            "firstName": required_string,
            "lastName": required_string,
            "assignmentName": required_string,
            "submissionTime": required_string
        },
        "required": [
            "userEmail",
            "submission_url",
            "firstName",
            "lastName",
            "assignmentName",
            "submissionTime"
        ]
    });

    match jsonschema::validate(&control_schema, body) {
        Ok(_) => Ok(()),
        Err(e) => Err(PipelineError::MalformedEvent(e.to_string())),
    }
}

/// Object storage key derived from submission metadata.
///
/// Identical metadata always yields the same key, so a redelivered event
/// overwrites its earlier object instead of creating a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageObjectKey(String);

impl StorageObjectKey {
    pub fn for_submission(event: &SubmissionEvent) -> Self {
        let joined = format!(
            "{}_{}_{}_{}",
            event.first_name, event.last_name, event.assignment_name, event.submission_time
        );
        // Colons and periods are not allowed in the key namespace
        Self(joined.replace([':', '.'], "-"))
    }
}

impl AsRef<str> for StorageObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
