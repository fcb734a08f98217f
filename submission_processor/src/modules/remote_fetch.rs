use crate::modules::error::{PipelineError, ZIP_CONTENT_TYPE};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use log::debug;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::time::Duration;

// Byte stream handed from the fetcher to object storage
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

// A remote file that passed validation, body not yet consumed
pub struct ValidatedPayload {
    // Declared media type, parameters stripped
    pub content_type: String,
    // Declared length, if the source sent one
    pub content_length: Option<u64>,
    pub stream: PayloadStream,
}

impl std::fmt::Debug for ValidatedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedPayload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

// Streams remote submission files and validates their headers
#[derive(Clone)]
pub struct RemoteFetcher {
    http_client: reqwest::Client,
}

impl RemoteFetcher {
    pub fn new(request_timeout: Option<Duration>) -> Result<Self, PipelineError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| PipelineError::FetchFailed(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    /// Opens a streaming GET and validates the declared headers.
    ///
    /// The content type is checked before the length, so a wrong type is reported
    /// even when the length is zero as well. The body is never buffered here.
    pub async fn fetch(&self, url: &str) -> Result<ValidatedPayload, PipelineError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            let error_msg = if e.is_timeout() {
                format!("timeout fetching '{}': {}", url, e)
            } else if e.is_connect() {
                format!("connection failed for '{}': {}", url, e)
            } else {
                format!("failed to fetch '{}': {}", url, e)
            };
            PipelineError::FetchFailed(error_msg)
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::FetchFailed(format!(
                "HTTP {} from '{}'",
                response.status(),
                url
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        if content_type != ZIP_CONTENT_TYPE {
            return Err(PipelineError::InvalidFormat {
                actual: if content_type.is_empty() {
                    "no content type".to_string()
                } else {
                    content_type
                },
            });
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        if content_length == Some(0) {
            return Err(PipelineError::EmptyPayload);
        }

        debug!(
            "Validated '{}': {} ({} bytes declared)",
            url,
            content_type,
            content_length.map_or("unknown".to_string(), |len| len.to_string())
        );

        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(ValidatedPayload {
            content_type,
            content_length,
            stream,
        })
    }
}

// Lowercased essence of a Content-Type value, e.g. "application/zip; q=1" -> "application/zip"
fn media_type(header_value: &str) -> String {
    header_value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
