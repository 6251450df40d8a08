use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::config::{MULTIPART_PART_SIZE, MULTIPART_THRESHOLD};
use crate::telemetry::TelemetryEvent;

/// Abstraction for writing a local file to a named object
/// This trait enables publishing to different backends (S3, in-memory for tests)
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Create or overwrite `bucket/key` with the full content of `path`.
    /// Either the object ends up complete or an error is returned.
    async fn put_file(&self, path: &Path, bucket: &str, key: &str) -> Result<()>;
}

/// ObjectWriter implementation for Amazon S3
#[derive(Clone)]
pub struct S3ObjectWriter {
    s3_client: Arc<S3Client>,
    multipart_threshold: u64,
    part_size: usize,
    telemetry_tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl S3ObjectWriter {
    /// Create a new S3ObjectWriter
    pub fn new(s3_client: Arc<S3Client>) -> Self {
        Self {
            s3_client,
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: MULTIPART_PART_SIZE,
            telemetry_tx: None,
        }
    }

    /// Build a client from the SDK's default configuration chain, pinned to
    /// `region` when one is given.
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let aws_config = loader.load().await;

        Self::new(Arc::new(S3Client::new(&aws_config)))
    }

    pub fn with_telemetry(mut self, telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        self.telemetry_tx = Some(telemetry_tx);
        self
    }

    fn report(&self, event: TelemetryEvent) {
        if let Some(tx) = &self.telemetry_tx {
            let _ = tx.send(event);
        }
    }

    async fn put_single(&self, path: &Path, bucket: &str, key: &str, size: u64) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .context("Failed to open export file for upload")?;

        self.s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow!("PutObject failed: {}", DisplayErrorContext(&e)))?;

        self.report(TelemetryEvent::UploadProgress { bytes: size });
        Ok(())
    }

    async fn put_multipart(&self, path: &Path, bucket: &str, key: &str) -> Result<()> {
        let created = self
            .s3_client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("CreateMultipartUpload failed: {}", DisplayErrorContext(&e)))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| anyhow!("S3 multipart upload missing upload id"))?
            .to_string();

        match self.upload_parts(path, bucket, key, &upload_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Abort so S3 never assembles a partial object
                if let Err(abort_err) = self
                    .s3_client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "Failed to abort multipart upload {}: {}",
                        upload_id,
                        DisplayErrorContext(&abort_err)
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let mut file = File::open(path)
            .await
            .context("Failed to open export file for upload")?;

        let mut parts = Vec::new();
        let mut part_number = 1i32;

        loop {
            let buffer = read_part(&mut file, self.part_size)
                .await
                .context("Failed to read export file")?;
            if buffer.is_empty() {
                break;
            }
            let part_len = buffer.len() as u64;

            let uploaded = self
                .s3_client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .map_err(|e| {
                    anyhow!(
                        "UploadPart {} failed: {}",
                        part_number,
                        DisplayErrorContext(&e)
                    )
                })?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            self.report(TelemetryEvent::UploadProgress { bytes: part_len });
            part_number += 1;
        }

        self.s3_client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| anyhow!("CompleteMultipartUpload failed: {}", DisplayErrorContext(&e)))?;

        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for S3ObjectWriter {
    async fn put_file(&self, path: &Path, bucket: &str, key: &str) -> Result<()> {
        let size = tokio::fs::metadata(path)
            .await
            .context("Failed to read export file metadata")?
            .len();

        self.report(TelemetryEvent::UploadStarted { total_bytes: size });

        if size >= self.multipart_threshold {
            tracing::info!(size, "using multipart upload");
            self.put_multipart(path, bucket, key).await
        } else {
            self.put_single(path, bucket, key, size).await
        }
    }
}

/// Read up to `part_size` bytes, short only at end of file
async fn read_part(file: &mut File, part_size: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(part_size);
    (&mut *file).take(part_size as u64).read_to_end(&mut buffer).await?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_part_splits_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut file = File::open(&path).await.unwrap();
        assert_eq!(read_part(&mut file, 4).await.unwrap(), b"0123");
        assert_eq!(read_part(&mut file, 4).await.unwrap(), b"4567");
        assert_eq!(read_part(&mut file, 4).await.unwrap(), b"89");
        assert!(read_part(&mut file, 4).await.unwrap().is_empty());
    }
}
