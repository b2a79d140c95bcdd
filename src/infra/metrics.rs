// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// One CSV file per metric stream, appended after every full
// validation pass:
//
//   <log_dir>/train/metrics.csv
//   <log_dir>/valid/metrics.csv
//
// Example:
//   epoch,loss,precision,recall,f1
//   0,0.693147,0.000000,0.000000,0.000000
//   1,0.412300,0.318000,0.274000,0.294362
//
// Precision and recall are the streaming values at that point of
// the run. Each row is written and flushed on its own, so there is
// nothing to close when training ends.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::ml::evaluation::{Stream, StreamMetrics};

const HEADER: &str = "epoch,loss,precision,recall,f1";

/// One row of a metric stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Completed epochs when the row was written (0 = baseline)
    pub epoch:     usize,
    pub loss:      f64,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, m: StreamMetrics) -> Self {
        Self {
            epoch,
            loss:      m.loss,
            precision: m.precision,
            recall:    m.recall,
            f1:        m.f1,
        }
    }
}

/// Appends rows to one stream's CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open the stream's file under `log_dir`, writing the header if the
    /// file is new. An existing file is appended to.
    pub fn open(log_dir: impl AsRef<Path>, stream: Stream) -> Result<Self> {
        let dir = log_dir.as_ref().join(stream.to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.loss, m.precision, m.recall, m.f1,
        )?;
        f.flush()?;

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// The train and validation streams of one run.
pub struct MetricStreams {
    train: MetricsLogger,
    valid: MetricsLogger,
}

impl MetricStreams {
    pub fn open(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        let streams = Self {
            train: MetricsLogger::open(log_dir, Stream::Train)?,
            valid: MetricsLogger::open(log_dir, Stream::Valid)?,
        };
        tracing::info!(
            "Metrics go to '{}' and '{}'",
            streams.train.csv_path().display(),
            streams.valid.csv_path().display()
        );
        Ok(streams)
    }

    pub fn log(&self, stream: Stream, row: &EpochMetrics) -> Result<()> {
        match stream {
            Stream::Train => self.train.log(row),
            Stream::Valid => self.valid.log(row),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(loss: f64) -> StreamMetrics {
        StreamMetrics { loss, precision: 0.5, recall: 0.25, f1: 1.0 / 3.0 }
    }

    #[test]
    fn test_streams_write_separate_files() {
        let dir   = tempfile::tempdir().unwrap();
        let train = MetricsLogger::open(dir.path(), Stream::Train).unwrap();
        let valid = MetricsLogger::open(dir.path(), Stream::Valid).unwrap();

        assert_eq!(train.csv_path(), dir.path().join("train").join("metrics.csv"));
        assert_eq!(valid.csv_path(), dir.path().join("valid").join("metrics.csv"));
    }

    #[test]
    fn test_rows_are_appended_after_the_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::open(dir.path(), Stream::Valid).unwrap();
        logger.log(&EpochMetrics::new(0, metrics(0.7))).unwrap();
        logger.log(&EpochMetrics::new(1, metrics(0.4))).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "0,0.700000,0.500000,0.250000,0.333333");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::open(dir.path(), Stream::Train)
            .unwrap()
            .log(&EpochMetrics::new(0, metrics(0.9)))
            .unwrap();

        let logger = MetricsLogger::open(dir.path(), Stream::Train).unwrap();
        let text = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_stream_pair_routes_rows() {
        let dir     = tempfile::tempdir().unwrap();
        let streams = MetricStreams::open(dir.path()).unwrap();
        streams.log(Stream::Valid, &EpochMetrics::new(2, metrics(0.1))).unwrap();

        let train = fs::read_to_string(dir.path().join("train/metrics.csv")).unwrap();
        let valid = fs::read_to_string(dir.path().join("valid/metrics.csv")).unwrap();
        assert_eq!(train.lines().count(), 1);
        assert!(valid.lines().nth(1).unwrap().starts_with("2,0.100000"));
    }
}
