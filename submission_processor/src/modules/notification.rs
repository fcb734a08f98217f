use crate::modules::{
    error::PipelineError,
    object_store::StoredObject,
    submission_event::SubmissionEvent,
};
use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;

// One outbound email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

// Transport that delivers a single email
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), PipelineError>;
}

// Mailgun HTTP API transport
#[derive(Clone)]
pub struct MailgunTransport {
    http_client: reqwest::Client,
    // e.g. https://api.mailgun.net
    api_base: String,
    // Sending domain registered with Mailgun
    domain: String,
    api_key: String,
}

impl MailgunTransport {
    pub fn new(api_base: String, domain: String, api_key: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            domain,
            api_key,
        }
    }
}

#[async_trait]
impl NotificationTransport for MailgunTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), PipelineError> {
        let url = format!("{}/v3/{}/messages", self.api_base, self.domain);
        let response = self
            .http_client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", message.from.as_str()),
                ("to", message.to.as_str()),
                ("subject", message.subject.as_str()),
                ("text", message.text.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::NotificationFailed(format!("failed to send email: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(PipelineError::NotificationFailed(format!(
                "mail API returned status {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

// Composes outcome emails and hands them to the transport
#[derive(Clone)]
pub struct NotificationSender {
    transport: Arc<dyn NotificationTransport>,
    sender_email: String,
}

impl NotificationSender {
    pub fn new(transport: Arc<dyn NotificationTransport>, sender_email: String) -> Self {
        Self {
            transport,
            sender_email,
        }
    }

    pub fn success_message(&self, event: &SubmissionEvent, stored: &StoredObject) -> EmailMessage {
        EmailMessage {
            from: self.sender_email.clone(),
            to: event.submitter_email.clone(),
            subject: format!("Submission received: {}", event.assignment_name),
            text: format!(
                "Hello {},\n\n\
                 Your submission for {} made at {} was downloaded and stored successfully.\n\n\
                 Stored at: {}\n",
                event.first_name, event.assignment_name, event.submission_time, stored.reference
            ),
        }
    }

    pub fn failure_message(&self, event: &SubmissionEvent, cause: &PipelineError) -> EmailMessage {
        EmailMessage {
            from: self.sender_email.clone(),
            to: event.submitter_email.clone(),
            subject: format!("Submission failed: {}", event.assignment_name),
            text: format!(
                "Hello {},\n\n\
                 Your submission for {} made at {} could not be accepted.\n\n\
                 Reason: {}\n\n\
                 Please correct the submission and submit again.\n",
                event.first_name,
                event.assignment_name,
                event.submission_time,
                cause.user_message()
            ),
        }
    }

    /// Sends a message without propagating transport errors.
    ///
    /// Returns whether the transport accepted it.
    pub async fn send_best_effort(&self, message: &EmailMessage) -> bool {
        match self.transport.send(message).await {
            Ok(()) => {
                info!("Email '{}' sent to {}", message.subject, message.to);
                true
            }
            Err(e) => {
                error!("Error sending email to {}: {}", message.to, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{sample_event, RecordingTransport};
    use crate::modules::submission_event::StorageObjectKey;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage {
            from: "submissions@mg.example.com".into(),
            to: "jane@example.com".into(),
            subject: "Submission received: HW1".into(),
            text: "Hello Jane".into(),
        }
    }

    #[tokio::test]
    async fn mailgun_posts_form_with_basic_auth() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .and(header_exists("authorization"))
            .and(body_string_contains("to=jane%40example.com"))
            .and(body_string_contains("subject=Submission+received%3A+HW1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"message":"Queued"}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = MailgunTransport::new(
            format!("{}/", mock_server.uri()),
            "mg.example.com".into(),
            "key-123".into(),
        );
        transport.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn mailgun_rejection_is_notification_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&mock_server)
            .await;

        let transport = MailgunTransport::new(mock_server.uri(), "mg.example.com".into(), "bad".into());
        let err = transport.send(&message()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotificationFailed(_)));
    }

    #[tokio::test]
    async fn best_effort_send_swallows_errors() {
        let transport = Arc::new(RecordingTransport::failing());
        let sender = NotificationSender::new(transport.clone(), "submissions@mg.example.com".into());
        assert!(!sender.send_best_effort(&message()).await);
        assert_eq!(transport.attempts().await, 1);
    }

    #[test]
    fn success_template_contains_reference() {
        let sender = NotificationSender::new(Arc::new(RecordingTransport::default()), "from@example.com".into());
        let event = sample_event("https://example.com/hw1.zip");
        let stored = StoredObject {
            key: StorageObjectKey::for_submission(&event),
            reference: "s3://submissions/Jane_Doe_HW1_2024-01-02T03-04-05-678Z".into(),
            bytes_written: 4,
        };
        let email = sender.success_message(&event, &stored);
        assert_eq!(email.to, "jane@example.com");
        assert_eq!(email.from, "from@example.com");
        assert!(email.text.contains("s3://submissions/Jane_Doe_HW1_2024-01-02T03-04-05-678Z"));
    }

    #[test]
    fn failure_template_contains_user_message() {
        let sender = NotificationSender::new(Arc::new(RecordingTransport::default()), "from@example.com".into());
        let event = sample_event("https://example.com/hw1.zip");
        let email = sender.failure_message(&event, &PipelineError::EmptyPayload);
        assert!(email.subject.starts_with("Submission failed"));
        assert!(email.text.contains("empty"));
    }
}
