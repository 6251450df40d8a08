//! Publisher: copy the export file, unmodified, to object storage

pub mod object_writer;

use std::fmt;
use std::path::Path;

pub use object_writer::{ObjectWriter, S3ObjectWriter};

use crate::error::IngestError;

/// Logical address of a published object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAddress {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// The explicit key when given, otherwise the file name of `local_path`
pub fn resolve_key(local_path: &Path, key: Option<&str>) -> Option<String> {
    match key {
        Some(key) => Some(key.to_string()),
        None => local_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
    }
}

/// Upload `local_path` to S3, using `region` or the ambient AWS configuration.
pub async fn upload(
    local_path: &Path,
    bucket: &str,
    key: Option<&str>,
    region: Option<&str>,
) -> Result<ObjectAddress, IngestError> {
    let writer = S3ObjectWriter::from_env(region).await;
    upload_with(&writer, local_path, bucket, key).await
}

/// Upload `local_path` through `writer`, overwriting any existing object.
pub async fn upload_with(
    writer: &dyn ObjectWriter,
    local_path: &Path,
    bucket: &str,
    key: Option<&str>,
) -> Result<ObjectAddress, IngestError> {
    let key = resolve_key(local_path, key).ok_or_else(|| IngestError::Upload {
        bucket: bucket.to_string(),
        key: String::new(),
        source: anyhow::anyhow!(
            "cannot derive an object key from {}; pass one explicitly",
            local_path.display()
        ),
    })?;

    writer
        .put_file(local_path, bucket, &key)
        .await
        .map_err(|source| IngestError::Upload {
            bucket: bucket.to_string(),
            key: key.clone(),
            source,
        })?;

    let address = ObjectAddress {
        bucket: bucket.to_string(),
        key,
    };
    tracing::info!("Uploaded {} to {}", local_path.display(), address);
    Ok(address)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory object store keyed by (bucket, key)
    #[derive(Default)]
    pub struct MemoryObjectWriter {
        pub objects: Mutex<HashMap<(String, String), Vec<u8>>>,
        pub calls: Mutex<usize>,
        pub fail_with: Option<String>,
    }

    impl MemoryObjectWriter {
        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Default::default()
            }
        }

        pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
        }

        pub fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ObjectWriter for MemoryObjectWriter {
        async fn put_file(&self, path: &Path, bucket: &str, key: &str) -> anyhow::Result<()> {
            *self.calls.lock().unwrap() += 1;
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{}", message);
            }
            let content = tokio::fs::read(path).await?;
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), content);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryObjectWriter;
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_key() {
        let path = PathBuf::from("/tmp/exports/data.csv");
        assert_eq!(resolve_key(&path, None).as_deref(), Some("data.csv"));
        assert_eq!(
            resolve_key(&path, Some("raw/2024/data.csv")).as_deref(),
            Some("raw/2024/data.csv")
        );
        assert_eq!(resolve_key(Path::new("/"), None), None);
    }

    #[test]
    fn test_address_display() {
        let address = ObjectAddress {
            bucket: "bucket".to_string(),
            key: "data.csv".to_string(),
        };
        assert_eq!(address.to_string(), "s3://bucket/data.csv");
    }

    #[tokio::test]
    async fn test_upload_defaults_key_to_basename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "id,val\n1,a\n").unwrap();
        let writer = MemoryObjectWriter::default();

        let address = upload_with(&writer, &path, "bucket", None).await.unwrap();

        assert_eq!(address.key, "data.csv");
        assert_eq!(
            writer.object("bucket", "data.csv").unwrap(),
            b"id,val\n1,a\n"
        );
    }

    #[tokio::test]
    async fn test_upload_twice_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        let writer = MemoryObjectWriter::default();
        writer.objects.lock().unwrap().insert(
            ("bucket".to_string(), "exports/data.csv".to_string()),
            b"stale remote content".to_vec(),
        );

        std::fs::write(&path, "id\n1\n").unwrap();
        upload_with(&writer, &path, "bucket", Some("exports/data.csv"))
            .await
            .unwrap();
        upload_with(&writer, &path, "bucket", Some("exports/data.csv"))
            .await
            .unwrap();

        assert_eq!(writer.call_count(), 2);
        assert_eq!(
            writer.object("bucket", "exports/data.csv").unwrap(),
            std::fs::read(&path).unwrap()
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_upload_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "id\n").unwrap();
        let writer = MemoryObjectWriter::failing("NoSuchBucket");

        let err = upload_with(&writer, &path, "missing", None)
            .await
            .unwrap_err();

        match err {
            IngestError::Upload { bucket, key, source } => {
                assert_eq!(bucket, "missing");
                assert_eq!(key, "data.csv");
                assert!(source.to_string().contains("NoSuchBucket"));
            }
            other => panic!("Expected Upload error, got {:?}", other),
        }
    }
}
