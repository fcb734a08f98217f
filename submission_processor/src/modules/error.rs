use thiserror::Error;

// Media type every submission must declare
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

// Errors raised while processing a single submission notification.
// Only MalformedEvent aborts an invocation, everything else is turned into
// a failure email and audit record by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    // The envelope or its message could not be decoded into a SubmissionEvent
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    // The remote file declared a content type other than ZIP
    #[error("invalid format: expected application/zip, got {actual}")]
    InvalidFormat { actual: String },

    // The remote file declared a content length of zero
    #[error("empty payload: remote file declared zero length")]
    EmptyPayload,

    // Transport level failure while fetching, including non-2xx statuses
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    // Object storage reported an error during the copy
    #[error("upload failed: {0}")]
    UploadFailed(String),

    // Notification transport rejected or failed to send a message
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    // Key-value store rejected the outcome record
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
}

impl PipelineError {
    /// Text that is safe to show to the submitter.
    ///
    /// Transport and storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InvalidFormat { actual } => format!(
                "The submitted file must be a ZIP archive ({}) and non-empty, but the URL served \"{}\".",
                ZIP_CONTENT_TYPE, actual
            ),
            PipelineError::EmptyPayload => {
                "The submitted file is empty. It must be a non-empty ZIP archive.".to_string()
            }
            PipelineError::FetchFailed(_) => {
                "Invalid URL: the submission could not be downloaded from the provided URL."
                    .to_string()
            }
            PipelineError::UploadFailed(_) => {
                "The submission could not be stored. Please resubmit.".to_string()
            }
            PipelineError::MalformedEvent(_)
            | PipelineError::NotificationFailed(_)
            | PipelineError::PersistenceFailed(_) => {
                "The submission could not be processed.".to_string()
            }
        }
    }
}
