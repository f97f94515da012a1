//! Configuration file parsing

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

use crate::cache::CacheConfig;
use crate::error::DexStatsError;
use crate::reading::{DEFAULT_MAX_COUNT, DEFAULT_WINDOW_MINUTES};
use crate::retry::RetryPolicy;
use crate::units::{GlucoseUnit, ThresholdPolicy};

const DEFAULT_CONFIG: &str = "\
# dexstats configuration
# Format: key value   # comment

ttl_secs          60      # how long fetched readings stay fresh
max_retries       3       # fetch attempts before giving up
retry_delay_secs  5       # wait between attempts
low_mgdl          70
high_mgdl         180
window_minutes    1440
max_count         288
units             mgdl    # mgdl or mmol
# readings_file   /path/to/readings.json
";

/// Configuration loaded from config.txt
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub ttl_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub low_mgdl: f64,
    pub high_mgdl: f64,
    pub window_minutes: u32,
    pub max_count: usize,
    /// Display unit for reports
    pub units: GlucoseUnit,
    pub readings_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_retries: 3,
            retry_delay_secs: 5,
            low_mgdl: ThresholdPolicy::DEFAULT_LOW_MGDL,
            high_mgdl: ThresholdPolicy::DEFAULT_HIGH_MGDL,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            max_count: DEFAULT_MAX_COUNT,
            units: GlucoseUnit::MgDl,
            readings_file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DexStatsError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut config = Config::default();

        for line in reader.lines() {
            let line = line?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse "key value" or "key value # comment"
            if let Some((key, rest)) = Self::parse_line(line) {
                let value = rest.split('#').next().unwrap_or("").trim();
                config.apply(key, value)?;
            }
        }

        // reject inverted bounds at load time rather than on first use
        config.threshold_policy()?;
        Ok(config)
    }

    /// Load the first of `candidates` that exists, or defaults if none do
    ///
    /// A file that exists but fails to parse or validate is an error.
    pub fn load_first<P: AsRef<Path>>(candidates: &[P]) -> Result<Self, DexStatsError> {
        match candidates.iter().map(|p| AsRef::<Path>::as_ref(p)).find(|path| path.exists()) {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::load(path).map_err(|e| {
                    DexStatsError::Config(format!("{}: {}", path.display(), e))
                })
            }
            None => {
                warn!("No config file found. Using defaults.");
                Ok(Config::default())
            }
        }
    }

    /// Write the commented default configuration
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), DexStatsError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Parse a single config line, returning (key, value)
    fn parse_line(line: &str) -> Option<(&str, &str)> {
        let mut parts = line.splitn(2, |c: char| c.is_whitespace());
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        if key.is_empty() || value.is_empty() {
            return None;
        }

        Some((key, value))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), DexStatsError> {
        match key {
            "ttl_secs" => self.ttl_secs = parse_value(key, value)?,
            "max_retries" => self.max_retries = parse_value(key, value)?,
            "retry_delay_secs" => self.retry_delay_secs = parse_value(key, value)?,
            "low_mgdl" => self.low_mgdl = parse_value(key, value)?,
            "high_mgdl" => self.high_mgdl = parse_value(key, value)?,
            "window_minutes" => self.window_minutes = parse_value(key, value)?,
            "max_count" => self.max_count = parse_value(key, value)?,
            "units" => self.units = value.parse()?,
            "readings_file" => self.readings_file = Some(PathBuf::from(value)),
            other => warn!("Ignoring unknown config key '{}'", other),
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            retry: RetryPolicy {
                max_attempts: self.max_retries,
                delay: Duration::from_secs(self.retry_delay_secs),
            },
        }
    }

    pub fn threshold_policy(&self) -> Result<ThresholdPolicy, DexStatsError> {
        ThresholdPolicy::new(self.low_mgdl, self.high_mgdl)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, DexStatsError> {
    value
        .parse()
        .map_err(|_| DexStatsError::Config(format!("invalid value '{}' for {}", value, key)))
}

/// Get the OS-specific data directory for dexstats
pub fn get_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dexstats")
}

/// Get the config file path
pub fn config_file_path() -> PathBuf {
    get_data_dir().join("config.txt")
}
