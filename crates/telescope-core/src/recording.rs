// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Scan log: one CSV row per sweep step.
//!
//! Rows are `azimuth,elevation,frequency_hz,peak_power`. The file is opened in
//! append mode and never gets a header row, so repeated runs simply extend it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "scan_results.csv";

/// Errors from the scan log.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write log row: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush log file: {0}")]
    Flush(#[from] std::io::Error),
}

/// One logged sweep step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Antenna azimuth in degrees
    pub azimuth: u32,
    /// Antenna elevation in degrees
    pub elevation: u32,
    /// Tuned center frequency in Hz
    pub frequency_hz: f64,
    /// Peak of the step's power spectrum
    pub peak_power: f64,
}

/// Append-only CSV writer for [`LogRecord`]s.
///
/// The file handle is held for the recorder's lifetime and released on drop.
pub struct ScanRecorder {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl std::fmt::Debug for ScanRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRecorder")
            .field("path", &self.path)
            .field("rows_written", &self.rows_written)
            .finish_non_exhaustive()
    }
}

impl ScanRecorder {
    /// Open `path` for appending, creating it if absent.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RecordError::Open {
                path: path.clone(),
                source,
            })?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        log::info!("Recording scan rows to {}", path.display());
        Ok(Self {
            writer,
            path,
            rows_written: 0,
        })
    }

    /// Append one row and flush it to disk.
    pub fn write(&mut self, record: &LogRecord) -> Result<(), RecordError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Rows written by this recorder.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScanRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::error!("Failed to flush {}: {}", self.path.display(), e);
        }
        log::info!(
            "Closed scan log {} ({} rows this sweep)",
            self.path.display(),
            self.rows_written
        );
    }
}

/// Read every row of a scan log.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<LogRecord>, RecordError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| RecordError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(file);

    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(frequency_hz: f64) -> LogRecord {
        LogRecord {
            azimuth: 120,
            elevation: 35,
            frequency_hz,
            peak_power: 1.5e9,
        }
    }

    #[test]
    fn test_rows_have_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");
        {
            let mut recorder = ScanRecorder::open_append(&path).unwrap();
            recorder.write(&record(1.4e9)).unwrap();
            assert_eq!(recorder.rows_written(), 1);
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.starts_with("120,35,1400000000"));
        assert_eq!(read_log(&path).unwrap(), vec![record(1.4e9)]);
    }

    #[test]
    fn test_append_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");
        std::fs::write(&path, "1,2,3.0,4.0\n").unwrap();

        let mut recorder = ScanRecorder::open_append(&path).unwrap();
        recorder.write(&record(1.41e9)).unwrap();
        recorder.write(&record(1.42e9)).unwrap();
        drop(recorder);

        let rows = read_log(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].azimuth, 1);
        assert_eq!(rows[2], record(1.42e9));
    }

    #[test]
    fn test_rows_are_flushed_before_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.csv");
        let mut recorder = ScanRecorder::open_append(&path).unwrap();
        recorder.write(&record(1.4e9)).unwrap();
        assert_eq!(read_log(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("scan.csv");
        assert!(matches!(
            ScanRecorder::open_append(&path),
            Err(RecordError::Open { .. })
        ));
    }
}
