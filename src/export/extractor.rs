use futures::TryStreamExt;
use futures::stream::TryChunksError;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::writer::{DelimitedConfig, ExistingFilePolicy, LineTerminator, open_export_file};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::db::{ConnectionParams, SourceConnection, TableName};
use crate::error::IngestError;
use crate::telemetry::TelemetryEvent;

/// Tunables for a single export
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Rows pulled from the source before they are appended to the file
    pub batch_size: NonZeroUsize,
    pub if_exists: ExistingFilePolicy,
    pub line_terminator: LineTerminator,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            if_exists: ExistingFilePolicy::default(),
            line_terminator: LineTerminator::default(),
        }
    }
}

/// Outcome of a completed export
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub rows: u64,
    pub batches: u64,
    pub bytes: u64,
}

/// Export every row of `table` into a CSV file at `destination`.
///
/// The table name is validated before any connection is attempted. The file
/// is only opened once the source has accepted the query, so a missing table
/// leaves the destination untouched. A failure while writing leaves the
/// partial file on disk.
pub async fn export_table(
    params: &ConnectionParams,
    table: &str,
    destination: &Path,
    options: &ExportOptions,
    telemetry_tx: Option<&mpsc::UnboundedSender<TelemetryEvent>>,
) -> Result<ExportSummary, IngestError> {
    let table = TableName::parse(table)?;
    let source = SourceConnection::connect(params).await?;
    export_from_source(source, &table, destination, options, telemetry_tx).await
}

/// Run an export over an already-open source, closing it on every exit path.
pub(crate) async fn export_from_source(
    mut source: SourceConnection,
    table: &TableName,
    destination: &Path,
    options: &ExportOptions,
    telemetry_tx: Option<&mpsc::UnboundedSender<TelemetryEvent>>,
) -> Result<ExportSummary, IngestError> {
    let result = write_export(&mut source, table, destination, options, telemetry_tx).await;
    source.close_quietly().await;
    result
}

async fn write_export(
    source: &mut SourceConnection,
    table: &TableName,
    destination: &Path,
    options: &ExportOptions,
    telemetry_tx: Option<&mpsc::UnboundedSender<TelemetryEvent>>,
) -> Result<ExportSummary, IngestError> {
    let sql = table.select_all_sql();
    let file_err = |e| IngestError::file_write(destination, e);

    let columns = source
        .describe_columns(&sql)
        .await
        .map_err(|e| IngestError::query(table, e))?;
    info!("Exporting {} columns from table {}", columns.len(), table);

    let config = DelimitedConfig::with_terminator(options.line_terminator);
    let mut file = open_export_file(destination, options.if_exists)
        .await
        .map_err(file_err)?;

    let header = config.encode(std::iter::once(&columns)).map_err(file_err)?;
    file.write_all(&header).await.map_err(file_err)?;

    let mut summary = ExportSummary {
        path: destination.to_path_buf(),
        columns,
        rows: 0,
        batches: 0,
        bytes: header.len() as u64,
    };

    let mut batches = source
        .fetch_rows(&sql)
        .try_chunks(options.batch_size.get());

    while let Some(batch) = batches
        .try_next()
        .await
        .map_err(|TryChunksError(_, e)| IngestError::query(table, e))?
    {
        let started = Instant::now();
        let encoded = config.encode(&batch).map_err(file_err)?;
        file.write_all(&encoded).await.map_err(file_err)?;

        let rows = batch.len() as u64;
        summary.rows += rows;
        summary.batches += 1;
        summary.bytes += encoded.len() as u64;
        debug!(batch = summary.batches, rows, "batch written");

        if let Some(tx) = telemetry_tx {
            // Receiver may already be closed
            let _ = tx.send(TelemetryEvent::BatchWritten {
                rows,
                bytes: encoded.len() as u64,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }
    }
    drop(batches);

    file.flush().await.map_err(file_err)?;
    file.sync_all().await.map_err(file_err)?;

    info!(
        "Export complete: {} rows in {} batches written to {}",
        summary.rows,
        summary.batches,
        destination.display()
    );

    Ok(summary)
}
