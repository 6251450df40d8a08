//! Configuration constants for the exporter
//!
//! Defaults for every command-line option live here so the CLI and the
//! library agree on them.

use std::num::NonZeroUsize;

// ============================================================================
// Source Database Defaults
// ============================================================================

pub const DEFAULT_HOST: &str = "localhost";

pub const DEFAULT_PORT: u16 = 3306;

pub const DEFAULT_USER: &str = "root";

pub const DEFAULT_DATABASE: &str = "taller6";

// ============================================================================
// Export Defaults
// ============================================================================

pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/data.csv";

/// Number of rows pulled from the server before they are appended to the file
///
/// 1000 rows keeps memory bounded for wide tables while amortizing the cost
/// of each file write.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(1000).unwrap();

// ============================================================================
// Object Storage Configuration
// ============================================================================

pub const DEFAULT_BUCKET: &str = "ingesta-exports";

/// Files at or above this size are sent with S3 multipart upload
///
/// A single PutObject is capped at 5 GB by S3 and holds the whole request
/// body in flight; multipart keeps each request to one part.
pub const MULTIPART_THRESHOLD: u64 = 64 * 1024 * 1024; // 64 MB

/// Size of each multipart part (S3 minimum is 5 MB, except the last part)
pub const MULTIPART_PART_SIZE: usize = 16 * 1024 * 1024; // 16 MB
