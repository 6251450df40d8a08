//! High-level runner API for the table exporter.
//!
//! This module provides the public interface used by the CLI: export a table
//! to a local CSV file, then publish that file to S3. The two stages run in
//! strict sequence; the upload only starts once the export file is complete
//! and closed.

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use crate::db::SourceConnection;
use crate::export::extractor::export_from_source;
use crate::publish::{ObjectWriter, S3ObjectWriter, upload_with};
use crate::telemetry::{ProgressStats, TelemetryEvent};

pub use crate::db::{ConnectionParams, ConnectionParamsBuilder, TableName};
pub use crate::error::IngestError;
pub use crate::export::{
    ExistingFilePolicy, ExportOptions, ExportSummary, LineTerminator, export_table,
};
pub use crate::publish::{ObjectAddress, upload};

/// Arguments for one export-and-publish run
///
/// Built once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct IngestArgs {
    // Source configuration
    pub connection: ConnectionParams,
    pub table: String,

    // Export configuration
    pub output_path: PathBuf,
    pub export: ExportOptions,

    // Destination configuration
    pub bucket: String,
    pub key: Option<String>,
    pub region: Option<String>,

    pub quiet: bool,

    // Test-only: inject a pre-opened source (for SQLite testing)
    #[cfg(test)]
    pub test_source: Option<std::sync::Arc<tokio::sync::Mutex<Option<SourceConnection>>>>,

    // Test-only: inject an object writer instead of S3
    #[cfg(test)]
    pub test_object_writer: Option<std::sync::Arc<dyn ObjectWriter>>,
}

/// Result of a completed run
#[derive(Debug)]
pub struct IngestResult {
    pub address: ObjectAddress,
    pub local_path: PathBuf,
    pub rows_exported: u64,
    /// Size of the export file; the published object is a byte-for-byte copy
    pub bytes_exported: u64,
    pub duration: Duration,
    /// p50/p90/p99 of per-batch write time in milliseconds
    pub batch_percentiles_ms: (Option<u64>, Option<u64>, Option<u64>),
}

/// Run the full pipeline: validate, export, publish.
///
/// A failure in any stage aborts the run. When the upload fails the export
/// file stays on disk so the upload alone can be retried.
///
/// # Example
///
/// ```no_run
/// use ingesta::runner::{ConnectionParamsBuilder, ExportOptions, IngestArgs, run_ingest};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = IngestArgs {
///     connection: ConnectionParamsBuilder::default()
///         .host("db.internal")
///         .database("shop")
///         .build()?,
///     table: "orders".to_string(),
///     output_path: "/tmp/orders.csv".into(),
///     export: ExportOptions::default(),
///     bucket: "my-bucket".to_string(),
///     key: None,
///     region: Some("us-east-1".to_string()),
///     quiet: true,
/// };
///
/// let result = run_ingest(args).await?;
/// println!("{} rows published to {}", result.rows_exported, result.address);
/// # Ok(())
/// # }
/// ```
pub async fn run_ingest(args: IngestArgs) -> Result<IngestResult, IngestError> {
    let start_time = Instant::now();

    // Fail on a hostile identifier before any I/O happens
    let table = TableName::parse(&args.table)?;

    let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
    let progress = setup_progress_tracking(args.quiet, telemetry_rx);

    let outcome = run_stages(&args, &table, telemetry_tx).await;

    // All senders are gone once the stages return, which ends the display task
    let stats = progress.await.unwrap_or_default();

    let (summary, address) = outcome?;
    let duration = start_time.elapsed();

    info!(
        "Ingest complete: {} rows from {} published to {} in {:.2}s",
        summary.rows,
        table,
        address,
        duration.as_secs_f64()
    );

    Ok(IngestResult {
        address,
        local_path: summary.path,
        rows_exported: summary.rows,
        bytes_exported: summary.bytes,
        duration,
        batch_percentiles_ms: stats.get_percentiles(),
    })
}

async fn run_stages(
    args: &IngestArgs,
    table: &TableName,
    telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>,
) -> Result<(ExportSummary, ObjectAddress), IngestError> {
    // Stage 1: export
    let source = open_source(args).await?;
    let summary = export_from_source(
        source,
        table,
        &args.output_path,
        &args.export,
        Some(&telemetry_tx),
    )
    .await?;

    // Stage 2: publish
    let writer = object_writer(args, telemetry_tx).await;
    let address = upload_with(
        writer.as_ref(),
        &summary.path,
        &args.bucket,
        args.key.as_deref(),
    )
    .await?;

    Ok((summary, address))
}

async fn open_source(args: &IngestArgs) -> Result<SourceConnection, IngestError> {
    #[cfg(test)]
    if let Some(test_source) = &args.test_source
        && let Some(source) = test_source.lock().await.take()
    {
        return Ok(source);
    }

    SourceConnection::connect(&args.connection).await
}

async fn object_writer(
    args: &IngestArgs,
    telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>,
) -> std::sync::Arc<dyn ObjectWriter> {
    #[cfg(test)]
    if let Some(writer) = &args.test_object_writer {
        drop(telemetry_tx);
        return writer.clone();
    }

    std::sync::Arc::new(
        S3ObjectWriter::from_env(args.region.as_deref())
            .await
            .with_telemetry(telemetry_tx),
    )
}

/// Setup progress tracking with progress bars
///
/// Returns the handle of the display task, which yields the aggregated
/// statistics once every telemetry sender has been dropped.
fn setup_progress_tracking(
    quiet: bool,
    mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
) -> tokio::task::JoinHandle<ProgressStats> {
    if quiet {
        // Still drain events so the statistics are reported
        return tokio::spawn(async move {
            let mut stats = ProgressStats::new();
            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);
            }
            stats
        });
    }

    let multi_progress = MultiProgress::new();

    let rows_bar = multi_progress.add(ProgressBar::new_spinner());
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("[{elapsed_precise}] Rows:   {spinner} {human_pos} | {per_sec} | {msg}")
    {
        rows_bar.set_style(style);
    }

    let upload_bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::default_bar().template(
        "[{elapsed_precise}] Upload: [{bar:30.yellow/blue}] {bytes}/{total_bytes} ({percent}%)",
    ) {
        upload_bar.set_style(style.progress_chars("=>-"));
    }

    let stats_bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] Batch Time: {msg}")
    {
        stats_bar.set_style(style);
    }

    tokio::spawn(async move {
        let mut stats = ProgressStats::new();

        while let Some(event) = telemetry_rx.recv().await {
            stats.update(&event);

            rows_bar.set_position(stats.rows_written);
            rows_bar.set_message(format!(
                "{} in {} batches",
                HumanBytes(stats.bytes_written),
                stats.batches_written
            ));
            upload_bar.set_length(stats.upload_total_bytes);
            upload_bar.set_position(stats.bytes_uploaded);

            let (p50, p90, p99) = stats.get_percentiles();
            if let (Some(p50), Some(p90), Some(p99)) = (p50, p90, p99) {
                stats_bar.set_message(format!("p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99));
            }
        }

        rows_bar.finish();
        upload_bar.finish();
        stats_bar.finish();
        stats
    })
}
