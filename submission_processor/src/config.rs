use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub aws: AwsConfig,
    pub submission_worker: SubmissionWorkerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
    pub notification: NotificationConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    // Overrides the service endpoints, e.g. for LocalStack
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionWorkerConfig {
    pub queue_url: String,
    pub max_number_of_messages: i32,
    // Long polling duration of a single receive call
    pub wait_time_seconds: i32,
    pub visibility_timeout: i32,
    pub polling_interval: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchConfig {
    // Transport timeout of the HTTP client, none when absent
    pub request_timeout_secs: Option<u64>,
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
    pub presign_expiry_secs: Option<u64>,
}

impl StorageConfig {
    pub fn presign_expiry(&self) -> Option<Duration> {
        self.presign_expiry_secs.map(Duration::from_secs)
    }
}

// Longest lifetime S3 accepts for a pre-signed URL
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

fn default_part_size() -> usize {
    8 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub api_base: String,
    pub domain: String,
    pub sender_email: String,
    // Name of the environment variable holding the API key
    pub api_key_env: String,
}

impl NotificationConfig {
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env).map_err(|_| ConfigError::Invalid {
            key: "notification.api_key_env".to_string(),
            message: format!("environment variable {} is not set", self.api_key_env),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    pub table_name: String,
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(contents)?;

    if config.storage.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid {
            key: "storage.bucket".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if config.audit.table_name.trim().is_empty() {
        return Err(ConfigError::Invalid {
            key: "audit.table_name".to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if !(1..=10).contains(&config.submission_worker.max_number_of_messages) {
        return Err(ConfigError::Invalid {
            key: "submission_worker.max_number_of_messages".to_string(),
            message: "must be between 1 and 10".to_string(),
        });
    }
    if let Some(expiry) = config.storage.presign_expiry_secs {
        if !(1..=MAX_PRESIGN_EXPIRY_SECS).contains(&expiry) {
            return Err(ConfigError::Invalid {
                key: "storage.presign_expiry_secs".to_string(),
                message: format!("must be between 1 and {}", MAX_PRESIGN_EXPIRY_SECS),
            });
        }
    }

    Ok(config)
}
