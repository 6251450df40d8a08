//! Error kinds surfaced by the export-and-transfer pipeline

use std::path::PathBuf;

/// Every failure is fatal for the run; the variant names the failing stage.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Table name does not match `^[A-Za-z0-9_$]+$`
    #[error("invalid table identifier '{name}': only letters, digits, '_' and '$' are allowed")]
    InvalidIdentifier { name: String },

    #[error("failed to connect to {host}:{port}/{database}")]
    Connection {
        host: String,
        port: u16,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("query against table '{table}' failed")]
    Query {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to write export file {}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to upload to s3://{bucket}/{key}")]
    Upload {
        bucket: String,
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub(crate) fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::FileWrite {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn query(table: impl ToString, source: sqlx::Error) -> Self {
        IngestError::Query {
            table: table.to_string(),
            source,
        }
    }
}
