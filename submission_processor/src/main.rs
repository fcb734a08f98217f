use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sqs::Client as SQSClient;
use aws_types::region::Region;
use crate::modules::{
    audit::DynamoAuditStore,
    notification::{MailgunTransport, NotificationSender},
    object_store::S3ObjectStore,
    pipeline::SubmissionPipeline,
    remote_fetch::RemoteFetcher,
    submission_worker::SubmissionWorker,
};
use log::{error, info};
use std::sync::Arc;


mod config;
mod modules;

const DEFAULT_CONFIG_PATH: &str = "submission_processor/Config.toml";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Config path can be given as the first argument
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration from {}: {}", config_path, e);
            return;
        }
    };

    let api_key = match config.notification.api_key() {
        Ok(key) => key,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    // Shared AWS configuration, credentials come from the default provider chain
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws.region.clone()));
    if let Some(endpoint_url) = &config.aws.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    let sdk_config = loader.load().await;

    let sqs_client = SQSClient::new(&sdk_config);
    let dynamo_client = DynamoClient::new(&sdk_config);

    // LocalStack serves buckets under the path, not as subdomains
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.aws.endpoint_url.is_some())
        .build();
    let s3_client = S3Client::from_conf(s3_config);

    let fetcher = match RemoteFetcher::new(config.fetch.request_timeout()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let object_store = S3ObjectStore::new(
        s3_client,
        config.storage.bucket.clone(),
        config.storage.part_size_bytes,
        config.storage.presign_expiry(),
    );

    let transport = MailgunTransport::new(
        config.notification.api_base.clone(),
        config.notification.domain.clone(),
        api_key,
    );
    let notifier = NotificationSender::new(Arc::new(transport), config.notification.sender_email.clone());

    let audit_store = DynamoAuditStore::new(dynamo_client, config.audit.table_name.clone());

    let pipeline = SubmissionPipeline::new(
        fetcher,
        Arc::new(object_store),
        notifier,
        Arc::new(audit_store),
    );

    info!(
        "Storing submissions in bucket {} and outcomes in table {}",
        config.storage.bucket, config.audit.table_name
    );

    let worker = SubmissionWorker::new(sqs_client, pipeline, config.submission_worker);

    // Run the worker
    worker.run().await;
}
