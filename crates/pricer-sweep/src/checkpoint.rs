//! Incremental artifact writing and checkpoint-based resumability.
//!
//! This module provides:
//! - `PointKey`: Unique identifier for a configuration point
//! - `IncrementalCsvWriter`: Appends rows to the artifact as points complete
//!
//! The file it writes has exactly the layout of [`output::save`](crate::output::save),
//! so a finished incremental sweep is also a loadable artifact.
//!
//! # Example
//!
//! ```ignore
//! use pricer_sweep::checkpoint::IncrementalCsvWriter;
//! use std::path::Path;
//!
//! // resume=true keeps rows already on disk
//! let writer = IncrementalCsvWriter::new(Path::new("summarySingleThreaded.csv"), true)?;
//!
//! if !writer.is_completed(&PointKey::from_point(&point)) {
//!     let row = run_point(&point)?;
//!     writer.write_row(&row)?;
//! }
//! ```

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::output::{self, COLUMNS};
use crate::table::{ResultRow, ResultTable};
use crate::types::{ConfigurationPoint, ThreadingMode, VariantId};

/// Full identity of a configuration point, used to skip completed work.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PointKey {
    pub variant: VariantId,
    pub dividends: u32,
    pub smoothing: bool,
    pub acceleration: bool,
    pub threading: ThreadingMode,
}

impl PointKey {
    pub fn from_point(point: &ConfigurationPoint) -> Self {
        Self {
            variant: point.variant.clone(),
            dividends: point.dividends,
            smoothing: point.smoothing,
            acceleration: point.acceleration,
            threading: point.threading,
        }
    }

    pub fn from_row(row: &ResultRow) -> Self {
        Self::from_point(&row.point())
    }
}

/// Incremental CSV writer with checkpoint support.
///
/// Flushes after every row so an interrupted sweep keeps everything it
/// finished. Guarded by mutexes so a shared reference can be handed to
/// progress callbacks.
pub struct IncrementalCsvWriter {
    path: PathBuf,
    writer: Mutex<csv::Writer<BufWriter<File>>>,
    completed: Mutex<HashSet<PointKey>>,
    /// Rows loaded from an existing file, in file order.
    resumed: ResultTable,
    /// Failed rows dropped from the file on resume.
    retried: usize,
}

impl IncrementalCsvWriter {
    /// Create a new incremental writer.
    ///
    /// - `resume=false`: creates the file (truncating), writes the header
    /// - `resume=true` and the file exists: loads its rows, appends new ones
    /// - `resume=true` and no file: same as `resume=false`
    ///
    /// Rows with every metric missing are failures recorded under
    /// [`FailurePolicy::Continue`](crate::sweep::FailurePolicy::Continue).
    /// Resuming drops them from the file so their points run again.
    pub fn new(path: &Path, resume: bool) -> Result<Self, PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };

        let (file, resumed, retried, needs_header) = if resume && path.exists() {
            let loaded = output::load(path)?;
            let resumed = loaded.filter(|row| !row.metrics().is_empty());
            let retried = loaded.len() - resumed.len();
            if retried > 0 {
                tracing::info!(
                    path = %path.display(),
                    retried,
                    "dropping failed rows from checkpoint; their points will be retried"
                );
                output::save(&resumed, path)?;
            }
            let file = OpenOptions::new().append(true).open(path).map_err(io_err)?;
            (file, resumed, retried, false)
        } else {
            (File::create(path).map_err(io_err)?, ResultTable::new(), 0, true)
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        if needs_header {
            writer.write_record(COLUMNS).map_err(|source| PersistenceError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            writer.flush().map_err(io_err)?;
        }

        let completed = resumed.iter().map(PointKey::from_row).collect();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            completed: Mutex::new(completed),
            resumed,
            retried,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows that were already on disk when the writer was opened.
    pub fn resumed(&self) -> &ResultTable {
        &self.resumed
    }

    pub fn resumed_count(&self) -> usize {
        self.resumed.len()
    }

    /// Points whose failed rows were dropped so they run again.
    pub fn retried_count(&self) -> usize {
        self.retried
    }

    pub fn is_completed(&self, key: &PointKey) -> bool {
        self.completed
            .lock()
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Append one row and flush it to disk.
    pub fn write_row(&self, row: &ResultRow) -> Result<(), PersistenceError> {
        {
            let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
            writer.serialize(row).map_err(|source| PersistenceError::Csv {
                path: self.path.clone(),
                source,
            })?;
            writer.flush().map_err(|source| PersistenceError::Io {
                path: self.path.clone(),
                source,
            })?;
        }

        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        completed.insert(PointKey::from_row(row));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MetricRecord;
    use tempfile::TempDir;

    fn mock_row(variant: &str, dividends: u32) -> ResultRow {
        let point = ConfigurationPoint {
            variant: VariantId::new(variant),
            dividends,
            smoothing: false,
            acceleration: true,
            threading: ThreadingMode::Single,
        };
        ResultRow::new(
            &point,
            MetricRecord {
                instruction_count: Some(5000 + u64::from(dividends)),
                avg_time_per_op_ms: Some(1.5),
                ops_per_second: None,
            },
        )
    }

    #[test]
    fn test_point_key_equality() {
        let a = PointKey::from_row(&mock_row("Release", 0));
        let b = PointKey::from_row(&mock_row("Release", 0));
        let c = PointKey::from_row(&mock_row("Release", 1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_incremental_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sweep.csv");

        let writer = IncrementalCsvWriter::new(&path, false).unwrap();
        assert_eq!(writer.completed_count(), 0);
        assert_eq!(writer.resumed_count(), 0);

        let row = mock_row("Release", 0);
        writer.write_row(&row).unwrap();
        assert!(writer.is_completed(&PointKey::from_row(&row)));

        let loaded = output::load(&path).unwrap();
        assert_eq!(loaded.rows(), &[row]);
    }

    #[test]
    fn test_resume_from_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sweep.csv");

        {
            let writer = IncrementalCsvWriter::new(&path, false).unwrap();
            writer.write_row(&mock_row("A", 0)).unwrap();
            writer.write_row(&mock_row("A", 1)).unwrap();
            writer.write_row(&mock_row("B", 0)).unwrap();
        }

        let writer = IncrementalCsvWriter::new(&path, true).unwrap();
        assert_eq!(writer.resumed_count(), 3);
        assert!(writer.is_completed(&PointKey::from_row(&mock_row("A", 1))));
        assert!(!writer.is_completed(&PointKey::from_row(&mock_row("B", 1))));

        writer.write_row(&mock_row("B", 1)).unwrap();
        assert_eq!(writer.completed_count(), 4);

        let loaded = output::load(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.rows()[3], mock_row("B", 1));
    }

    #[test]
    fn test_resume_drops_failed_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sweep.csv");
        let failed = ResultRow::new(&mock_row("A", 1).point(), MetricRecord::default());

        {
            let writer = IncrementalCsvWriter::new(&path, false).unwrap();
            writer.write_row(&mock_row("A", 0)).unwrap();
            writer.write_row(&failed).unwrap();
            writer.write_row(&mock_row("A", 2)).unwrap();
        }

        let writer = IncrementalCsvWriter::new(&path, true).unwrap();
        assert_eq!(writer.resumed_count(), 2);
        assert_eq!(writer.retried_count(), 1);
        assert!(!writer.is_completed(&PointKey::from_row(&failed)));

        writer.write_row(&mock_row("A", 1)).unwrap();
        let loaded = output::load(&path).unwrap();
        let divs: Vec<u32> = loaded.iter().map(|r| r.dividends).collect();
        assert_eq!(divs, vec![0, 2, 1]);
        assert!(loaded.iter().all(|r| !r.metrics().is_empty()));
    }

    #[test]
    fn test_resume_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.csv");

        let writer = IncrementalCsvWriter::new(&path, true).unwrap();
        assert_eq!(writer.resumed_count(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_resume_rejects_foreign_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("foreign.csv");
        std::fs::write(&path, "tool,preset\nx,y\n").unwrap();

        assert!(matches!(
            IncrementalCsvWriter::new(&path, true),
            Err(PersistenceError::Header { .. })
        ));
    }
}
