/// Telemetry events sent from the pipeline stages to the progress display
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A batch of rows was appended to the export file
    BatchWritten {
        rows: u64,
        bytes: u64,
        duration_ms: u64,
    },
    /// Upload of the export file began
    UploadStarted { total_bytes: u64 },
    /// Bytes confirmed stored by the object store
    UploadProgress { bytes: u64 },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub rows_written: u64,
    pub bytes_written: u64,
    pub batches_written: u64,
    pub upload_total_bytes: u64,
    pub bytes_uploaded: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::BatchWritten {
                rows,
                bytes,
                duration_ms,
            } => {
                self.rows_written += rows;
                self.bytes_written += bytes;
                self.batches_written += 1;
                self.batch_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::UploadStarted { total_bytes } => {
                self.upload_total_bytes = *total_bytes;
                self.bytes_uploaded = 0;
            }
            TelemetryEvent::UploadProgress { bytes } => {
                self.bytes_uploaded += bytes;
            }
        }
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_accumulate() {
        let mut stats = ProgressStats::new();
        for (rows, ms) in [(1000, 12), (1000, 8), (250, 3)] {
            stats.update(&TelemetryEvent::BatchWritten {
                rows,
                bytes: rows * 10,
                duration_ms: ms,
            });
        }

        assert_eq!(stats.rows_written, 2250);
        assert_eq!(stats.bytes_written, 22500);
        assert_eq!(stats.batches_written, 3);
        assert_eq!(stats.get_percentiles(), (Some(8), Some(12), Some(12)));
    }

    #[test]
    fn test_upload_progress_resets_on_start() {
        let mut stats = ProgressStats::new();
        stats.update(&TelemetryEvent::UploadStarted { total_bytes: 100 });
        stats.update(&TelemetryEvent::UploadProgress { bytes: 60 });
        stats.update(&TelemetryEvent::UploadStarted { total_bytes: 100 });
        stats.update(&TelemetryEvent::UploadProgress { bytes: 40 });

        assert_eq!(stats.upload_total_bytes, 100);
        assert_eq!(stats.bytes_uploaded, 40);
    }

    #[test]
    fn test_percentile_empty() {
        assert_eq!(ProgressStats::new().percentile(50.0), None);
    }
}
