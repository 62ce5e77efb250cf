//! Per-operator metrics files.
//!
//! Samples are streamed from the sampler over a channel and appended by a
//! blocking writer task, so the file grows while the operator runs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use opsize_common::constants::{METRICS_FILE_EXTENSION, METRICS_FILE_HEADER};
use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::MetricSample;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

/// Returns the metrics file path for an operator.
#[must_use]
pub fn metrics_path(dir: &Path, operator: &str) -> PathBuf {
    dir.join(format!("{operator}.{METRICS_FILE_EXTENSION}"))
}

/// Formats one sample as a CSV row.
#[must_use]
pub fn format_row(sample: &MetricSample) -> String {
    format!(
        "{},{:.3},{:.3}",
        sample.timestamp.to_rfc3339(),
        sample.cpu_percent,
        sample.memory_mb
    )
}

/// An open metrics file being fed by the sampler.
#[derive(Debug)]
pub struct MetricsFile {
    path: PathBuf,
    sender: UnboundedSender<MetricSample>,
    task: JoinHandle<Result<usize>>,
}

impl MetricsFile {
    /// Creates the file, writes the header, and starts the writer task.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(dir: &Path, operator: &str) -> Result<Self> {
        let path = metrics_path(dir, operator);
        let io_err = |e| OpsizeError::Io {
            path: path.clone(),
            source: e,
        };
        let mut writer = BufWriter::new(File::create(&path).map_err(io_err)?);
        writeln!(writer, "{METRICS_FILE_HEADER}").map_err(io_err)?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<MetricSample>();
        let task_path = path.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<usize> {
            let io_err = |e| OpsizeError::Io {
                path: task_path.clone(),
                source: e,
            };
            let mut rows = 0;
            while let Some(sample) = receiver.blocking_recv() {
                writeln!(writer, "{}", format_row(&sample)).map_err(io_err)?;
                rows += 1;
            }
            writer.flush().map_err(io_err)?;
            Ok(rows)
        });
        tracing::debug!(path = %path.display(), "metrics file opened");
        Ok(Self { path, sender, task })
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sender the sampler streams samples into.
    #[must_use]
    pub fn sink(&self) -> UnboundedSender<MetricSample> {
        self.sender.clone()
    }

    /// Closes the stream and waits for every row to be written.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if a row could not be written.
    pub async fn finish(self) -> Result<usize> {
        drop(self.sender);
        let rows = self.task.await.map_err(|e| OpsizeError::Io {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })??;
        tracing::debug!(path = %self.path.display(), rows, "metrics file closed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn path_is_named_after_operator() {
        let p = metrics_path(Path::new("/tmp/metrics"), "dicom-reader");
        assert_eq!(p, PathBuf::from("/tmp/metrics/dicom-reader.csv"));
    }

    #[test]
    fn row_format() {
        let sample = MetricSample {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("ts"),
            cpu_percent: 123.456_78,
            memory_mb: 42.0,
        };
        assert_eq!(format_row(&sample), "2024-05-01T12:00:00+00:00,123.457,42.000");
    }

    #[tokio::test]
    async fn streamed_samples_are_written_after_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = MetricsFile::create(dir.path(), "writer").expect("create");
        let sink = file.sink();
        for i in 0..3 {
            sink.send(MetricSample {
                timestamp: Utc::now(),
                cpu_percent: f64::from(i),
                memory_mb: 1.0,
            })
            .expect("send");
        }
        drop(sink);
        let path = file.path().to_path_buf();
        assert_eq!(file.finish().await.expect("finish"), 3);

        let content = std::fs::read_to_string(path).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "timestamp,cpu_percent,memory_mb");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn unwritable_directory_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = MetricsFile::create(&dir.path().join("missing"), "a");
        assert!(err.is_err());
    }
}
