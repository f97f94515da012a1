//! Reading sources: the remote provider seam and a JSON file implementation

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use log::info;
use thiserror::Error;

use crate::reading::{Reading, ReadingSeries};

/// Failure of a single fetch attempt; every variant is treated as retryable
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON decoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source returned no readings")]
    Empty,
}

/// Provider of CGM readings
///
/// Implementations return readings ordered oldest first, covering at most
/// `window_minutes` and at most `max_count` samples.
pub trait ReadingSource: Send + Sync {
    fn fetch(&self, window_minutes: u32, max_count: usize) -> Result<Vec<Reading>, SourceError>;
}

impl<S: ReadingSource + ?Sized> ReadingSource for Arc<S> {
    fn fetch(&self, window_minutes: u32, max_count: usize) -> Result<Vec<Reading>, SourceError> {
        (**self).fetch(window_minutes, max_count)
    }
}

impl<S: ReadingSource + ?Sized> ReadingSource for Box<S> {
    fn fetch(&self, window_minutes: u32, max_count: usize) -> Result<Vec<Reading>, SourceError> {
        (**self).fetch(window_minutes, max_count)
    }
}

/// Reads a JSON array of readings exported from the provider
///
/// The file is re-read on every fetch. The window is measured back from the
/// newest reading in the file, not from the current time, so an export can
/// be replayed later.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReadingSource for JsonFileSource {
    fn fetch(&self, window_minutes: u32, max_count: usize) -> Result<Vec<Reading>, SourceError> {
        let contents = fs::read_to_string(&self.path)?;
        let mut readings: Vec<Reading> = serde_json::from_str(&contents)?;
        info!("Loaded {} readings from {}", readings.len(), self.path.display());

        // stable sort keeps duplicate timestamps in file order
        readings.sort_by_key(Reading::timestamp);

        if let Some(newest) = readings.last().map(Reading::timestamp) {
            let cutoff = newest - ChronoDuration::minutes(i64::from(window_minutes));
            readings.retain(|r| r.timestamp() > cutoff);
        }

        let series = ReadingSeries::bounded(readings, max_count);
        Ok(series.readings().to_vec())
    }
}
