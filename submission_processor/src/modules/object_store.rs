use crate::modules::{
    error::PipelineError,
    remote_fetch::PayloadStream,
    submission_event::StorageObjectKey,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client as S3Client,
};
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use std::time::Duration;
use tokio_stream::StreamExt;

// S3 rejects non-final multipart parts smaller than this
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

// Reference to an object after a completed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: StorageObjectKey,
    // URL or URI the submitter can use to locate the object
    pub reference: String,
    pub bytes_written: u64,
}

/// Durable object storage for submission archives.
///
/// Writes to the same key overwrite. A failed write may leave a partial object
/// behind; it is replaced by the next successful write with the same key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_stream(
        &self,
        key: &StorageObjectKey,
        content_type: &str,
        body: PayloadStream,
    ) -> Result<StoredObject, PipelineError>;
}

// S3 backed store, streaming through a multipart upload
#[derive(Clone)]
pub struct S3ObjectStore {
    s3_client: S3Client,
    bucket: String,
    // Bytes buffered before a part is sent
    part_size: usize,
    // When set, references are pre-signed GET URLs valid for this long
    presign_expiry: Option<Duration>,
}

impl S3ObjectStore {
    pub fn new(
        s3_client: S3Client,
        bucket: String,
        part_size: usize,
        presign_expiry: Option<Duration>,
    ) -> Self {
        Self {
            s3_client,
            bucket,
            part_size: part_size.max(MIN_PART_SIZE),
            presign_expiry,
        }
    }

    async fn upload_part(
        &self,
        key: &StorageObjectKey,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<CompletedPart, PipelineError> {
        let output = self
            .s3_client
            .upload_part()
            .bucket(&self.bucket)
            .key(key.as_ref())
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| PipelineError::UploadFailed(format!("part {}: {}", part_number, e)))?;

        debug!(" -- Uploaded part {} of {}", part_number, key);

        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }

    // Copies the whole stream into an already created multipart upload
    async fn copy_parts(
        &self,
        key: &StorageObjectKey,
        upload_id: &str,
        mut body: PayloadStream,
    ) -> Result<(Vec<CompletedPart>, u64), PipelineError> {
        let mut parts = Vec::new();
        let mut buffer = BytesMut::with_capacity(self.part_size);
        let mut bytes_written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| PipelineError::UploadFailed(format!("read error: {}", e)))?;
            bytes_written += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= self.part_size {
                let data = buffer.split_to(self.part_size).freeze();
                let part_number = parts.len() as i32 + 1;
                parts.push(self.upload_part(key, upload_id, part_number, data).await?);
            }
        }

        // The last part may be smaller than the minimum; an upload needs at least one part
        if !buffer.is_empty() || parts.is_empty() {
            let part_number = parts.len() as i32 + 1;
            parts.push(self.upload_part(key, upload_id, part_number, buffer.freeze()).await?);
        }

        Ok((parts, bytes_written))
    }

    // The object is already stored when this runs, so a presigning failure
    // falls back to the plain URI instead of failing the write
    async fn reference(&self, key: &StorageObjectKey) -> String {
        let plain = format!("s3://{}/{}", self.bucket, key);
        let Some(expiry) = self.presign_expiry else {
            return plain;
        };

        let presigning = match PresigningConfig::expires_in(expiry) {
            Ok(presigning) => presigning,
            Err(e) => {
                warn!("Error building presigning config for {}: {}", key, e);
                return plain;
            }
        };
        match self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(key.as_ref())
            .presigned(presigning)
            .await
        {
            Ok(request) => request.uri().to_string(),
            Err(e) => {
                warn!("Error presigning {}: {}", key, e);
                plain
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_stream(
        &self,
        key: &StorageObjectKey,
        content_type: &str,
        body: PayloadStream,
    ) -> Result<StoredObject, PipelineError> {
        let created = self
            .s3_client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key.as_ref())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        let upload_id = match created.upload_id() {
            Some(id) => id.to_string(),
            None => {
                return Err(PipelineError::UploadFailed(
                    "no upload id returned for multipart upload".to_string(),
                ))
            }
        };

        let copied = self.copy_parts(key, &upload_id, body).await;

        let completed = match copied {
            Ok((parts, bytes_written)) => self
                .s3_client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key.as_ref())
                .upload_id(&upload_id)
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(parts))
                        .build(),
                )
                .send()
                .await
                .map(|_| bytes_written)
                .map_err(|e| PipelineError::UploadFailed(e.to_string())),
            Err(e) => Err(e),
        };

        let bytes_written = match completed {
            Ok(bytes_written) => bytes_written,
            Err(e) => {
                // Incomplete uploads are invisible but still billed, drop them
                if let Err(abort_err) = self
                    .s3_client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key.as_ref())
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("Error aborting multipart upload for {}: {}", key, abort_err);
                }
                return Err(e);
            }
        };

        Ok(StoredObject {
            key: key.clone(),
            reference: self.reference(key).await,
            bytes_written,
        })
    }
}
