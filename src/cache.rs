//! Time-windowed cache of CGM readings with bounded, single-flight refresh
//!
//! An entry is either fresh (younger than the ttl) or stale/absent. Fresh
//! entries are served without touching the source. A stale or absent entry
//! triggers one refresh sequence: up to `max_attempts` fetches spaced by the
//! retry delay. Concurrent callers never start a second sequence for the
//! same request:
//!
//! - a caller that finds a fresh entry returns it at once, even while a
//!   refresh for another request shape is running;
//! - a caller that finds the entry stale while a refresh is running waits for
//!   that refresh and shares its outcome, success or `SourceUnavailable`.
//!
//! When every attempt fails the call fails and the old entry is kept but not
//! served; expired data is never returned.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::DexStatsError;
use crate::reading::{ReadingSeries, DEFAULT_MAX_COUNT, DEFAULT_WINDOW_MINUTES};
use crate::retry::{retry, RetryPolicy};
use crate::source::{ReadingSource, SourceError};

/// Cache tuning, supplied once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Window and sample bound a series was fetched for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestShape {
    window_minutes: u32,
    max_count: usize,
}

/// The cached series; replaced as a whole on every successful refresh
#[derive(Debug, Clone)]
pub struct CacheEntry {
    series: Arc<ReadingSeries>,
    fetched_at: Instant,
    shape: RequestShape,
}

impl CacheEntry {
    pub fn series(&self) -> &Arc<ReadingSeries> {
        &self.series
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

#[derive(Debug, Clone)]
enum RefreshOutcome {
    Fetched(Arc<ReadingSeries>),
    Failed { attempts: u32, last_error: String },
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    refreshing: bool,
    /// Number of finished refresh sequences; lets waiters tell that the
    /// refresh they waited on is over.
    completed: u64,
    last_outcome: Option<(RequestShape, RefreshOutcome)>,
}

pub struct ReadingCache {
    source: Box<dyn ReadingSource>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    state: Mutex<CacheState>,
    refreshed: Condvar,
}

impl ReadingCache {
    /// Create a cache over `source` using the system clock
    pub fn new<S: ReadingSource + 'static>(source: S, config: CacheConfig) -> Self {
        Self::with_clock(source, config, Arc::new(SystemClock))
    }

    pub fn with_clock<S: ReadingSource + 'static>(source: S, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: Box::new(source),
            clock,
            config,
            state: Mutex::new(CacheState::default()),
            refreshed: Condvar::new(),
        }
    }

    /// Readings for the default one-day window
    pub fn get_default_readings(&self) -> Result<Arc<ReadingSeries>, DexStatsError> {
        self.get_readings(DEFAULT_WINDOW_MINUTES, DEFAULT_MAX_COUNT)
    }

    /// Return the cached series if fresh, otherwise refresh it from the source
    ///
    /// Blocks for the whole retry sequence when a refresh is needed, either
    /// running it or waiting for the caller that is.
    pub fn get_readings(&self, window_minutes: u32, max_count: usize) -> Result<Arc<ReadingSeries>, DexStatsError> {
        let shape = RequestShape { window_minutes, max_count };
        let mut state = self.lock();

        loop {
            if let Some(series) = self.fresh_series(&state, shape) {
                debug!("Returning cached glucose data");
                return Ok(series);
            }
            if !state.refreshing {
                break;
            }

            debug!("Refresh already in flight, waiting for it");
            let seen = state.completed;
            while state.refreshing {
                state = self.refreshed.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            if state.completed == seen {
                continue;
            }
            match &state.last_outcome {
                Some((done, RefreshOutcome::Fetched(series))) if *done == shape => {
                    return Ok(Arc::clone(series));
                }
                Some((done, RefreshOutcome::Failed { attempts, last_error })) if *done == shape => {
                    return Err(DexStatsError::SourceUnavailable {
                        attempts: *attempts,
                        last_error: last_error.clone(),
                    });
                }
                // the refresh served another request shape
                _ => continue,
            }
        }

        state.refreshing = true;
        drop(state);
        self.refresh(shape)
    }

    /// Whether a fresh entry is cached, regardless of request shape
    pub fn is_fresh(&self) -> bool {
        let state = self.lock();
        state
            .entry
            .as_ref()
            .is_some_and(|entry| self.is_entry_fresh(entry))
    }

    /// Snapshot of the current entry, fresh or not
    pub fn entry(&self) -> Option<CacheEntry> {
        self.lock().entry.clone()
    }

    /// Drop the cached entry so the next call goes to the source
    pub fn invalidate(&self) {
        self.lock().entry = None;
    }

    fn refresh(&self, shape: RequestShape) -> Result<Arc<ReadingSeries>, DexStatsError> {
        let mut guard = RefreshGuard { cache: self, shape, armed: true };

        let fetched = retry(&self.config.retry, self.clock.as_ref(), |attempt| {
            debug!("Fetching glucose data (attempt {})", attempt);
            let readings = self.source.fetch(shape.window_minutes, shape.max_count)?;
            if readings.is_empty() {
                return Err(SourceError::Empty);
            }
            Ok(ReadingSeries::bounded(readings, shape.max_count))
        });

        let mut state = self.lock();
        guard.armed = false;
        state.refreshing = false;
        state.completed += 1;

        let result = match fetched {
            Ok(series) => {
                let series = Arc::new(series);
                info!("Fetched {} readings from source", series.len());
                state.entry = Some(CacheEntry {
                    series: Arc::clone(&series),
                    fetched_at: self.clock.now(),
                    shape,
                });
                state.last_outcome = Some((shape, RefreshOutcome::Fetched(Arc::clone(&series))));
                Ok(series)
            }
            Err(exhausted) => {
                let last_error = exhausted
                    .last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no fetch attempts configured".to_string());
                warn!("Giving up on source after {} attempts: {}", exhausted.attempts, last_error);
                state.last_outcome = Some((
                    shape,
                    RefreshOutcome::Failed {
                        attempts: exhausted.attempts,
                        last_error: last_error.clone(),
                    },
                ));
                Err(DexStatsError::SourceUnavailable {
                    attempts: exhausted.attempts,
                    last_error,
                })
            }
        };

        drop(state);
        self.refreshed.notify_all();
        result
    }

    fn fresh_series(&self, state: &CacheState, shape: RequestShape) -> Option<Arc<ReadingSeries>> {
        state
            .entry
            .as_ref()
            .filter(|entry| entry.shape == shape && !entry.series.is_empty() && self.is_entry_fresh(entry))
            .map(|entry| Arc::clone(&entry.series))
    }

    fn is_entry_fresh(&self, entry: &CacheEntry) -> bool {
        self.clock.now().saturating_duration_since(entry.fetched_at) < self.config.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight marker if the refresh unwinds, so waiters wake up
struct RefreshGuard<'a> {
    cache: &'a ReadingCache,
    shape: RequestShape,
    armed: bool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cache.lock();
        state.refreshing = false;
        state.completed += 1;
        state.last_outcome = Some((
            self.shape,
            RefreshOutcome::Failed {
                attempts: 0,
                last_error: "refresh aborted".to_string(),
            },
        ));
        drop(state);
        self.cache.refreshed.notify_all();
    }
}
