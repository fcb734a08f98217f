use aws_sdk_sqs::client::Client as SQSClient;
use aws_sdk_sqs::types::Message;
use crate::{
    config::SubmissionWorkerConfig,
    modules::pipeline::SubmissionPipeline,
};
use log::{debug, error, info, warn};
use std::time;
use tokio::{
    task,
    time::sleep,
};

// Handles
// - Long polling submission notifications from SQS
// - Running the submission pipeline for each of them in its own task
// - Deleting every handled notification, since the pipeline never asks
//   for a redelivery
#[derive(Clone)]
pub struct SubmissionWorker {

    // SQS client for reading notifications
    sqs_client: SQSClient,

    // Pipeline shared by all invocations
    pipeline: SubmissionPipeline,

    // Queue and polling settings
    config: SubmissionWorkerConfig,
}

impl SubmissionWorker {
    pub fn new(sqs_client: SQSClient, pipeline: SubmissionPipeline, config: SubmissionWorkerConfig) -> Self {
        Self { sqs_client, pipeline, config }
    }

    // Main polling loop, one spawned task per notification
    pub async fn run(self) {
        info!("Polling {} for submission notifications", self.config.queue_url);

        loop {
            match self.sqs_client
                .receive_message()
                .queue_url(&self.config.queue_url)
                .max_number_of_messages(self.config.max_number_of_messages)
                .wait_time_seconds(self.config.wait_time_seconds)
                .visibility_timeout(self.config.visibility_timeout)
                .send()
                .await {
                Ok(output) => {
                    let messages = output.messages.unwrap_or_default();
                    debug!("Received {} notification(s)", messages.len());

                    for message in messages {
                        let worker = self.clone();
                        let receipt_handle = match message.receipt_handle.clone() {
                            Some(receipt_handle) => receipt_handle,
                            None => {
                                warn!("No receipt handle found for message {:?}", message.message_id);
                                continue;
                            }
                        };
                        task::spawn(async move {
                            worker.process_message(&message).await;
                            worker.delete_message(receipt_handle).await;
                        });
                    }
                },
                Err(e) => {
                    error!("Error receiving messages: {:?}", e);
                }
            };

            sleep(time::Duration::from_secs(self.config.polling_interval)).await;
        }
    }

    // One invocation of the pipeline for a single queue message
    pub async fn process_message(&self, message: &Message) {
        let Some(body) = &message.body else {
            warn!("No body found in message {:?}", message.message_id);
            return;
        };

        match self.pipeline.handle(body).await {
            Ok(outcome) => debug!(
                "Outcome {} ({}) for message {:?}: stored={} notified={} recorded={}",
                outcome.record.id,
                outcome.record.status,
                message.message_id,
                outcome.stored.is_some(),
                outcome.notified,
                outcome.recorded
            ),
            // Malformed notifications are not retried
            Err(e) => warn!("Discarding message {:?}: {}", message.message_id, e),
        }
    }

    async fn delete_message(&self, receipt_handle: String) {
        match self.sqs_client
            .delete_message()
            .queue_url(&self.config.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
        {
            Ok(_) => debug!("Message deleted from the queue"),
            Err(e) => error!("Error deleting message: {:?}", e),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{
        notification::NotificationSender,
        remote_fetch::RemoteFetcher,
        testing::{envelope_for, sample_event, MemoryAuditStore, MemoryObjectStore, RecordingTransport},
    };
    use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
    use std::sync::Arc;

    fn worker(transport: Arc<RecordingTransport>, audit: Arc<MemoryAuditStore>) -> SubmissionWorker {
        let sqs_config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-1"))
            .credentials_provider(Credentials::new("some_key_id", "some_secret", None, None, "test"))
            .build();
        let pipeline = SubmissionPipeline::new(
            RemoteFetcher::new(None).unwrap(),
            Arc::new(MemoryObjectStore::default()),
            NotificationSender::new(transport, "submissions@mg.example.com".into()),
            audit,
        );
        SubmissionWorker::new(
            SQSClient::from_conf(sqs_config),
            pipeline,
            SubmissionWorkerConfig {
                queue_url: "http://localhost:4566/000000000000/submissions".into(),
                max_number_of_messages: 1,
                wait_time_seconds: 0,
                visibility_timeout: 30,
                polling_interval: 1,
            },
        )
    }

    #[tokio::test]
    async fn message_without_body_is_skipped() {
        let transport = Arc::new(RecordingTransport::default());
        let audit = Arc::new(MemoryAuditStore::default());
        let worker = worker(transport.clone(), audit.clone());

        worker.process_message(&Message::builder().message_id("m-1").build()).await;

        assert_eq!(transport.attempts().await, 0);
        assert_eq!(audit.attempts().await, 0);
    }

    #[tokio::test]
    async fn message_body_runs_the_pipeline() {
        let transport = Arc::new(RecordingTransport::default());
        let audit = Arc::new(MemoryAuditStore::default());
        let worker = worker(transport.clone(), audit.clone());

        // Refused port, so the invocation ends on the failure branch
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let body = envelope_for(&sample_event(&format!("http://127.0.0.1:{}/hw1.zip", port)));

        worker.process_message(&Message::builder().message_id("m-2").body(body).build()).await;

        assert_eq!(transport.sent().await.len(), 1);
        assert_eq!(audit.records().await.len(), 1);
    }
}
