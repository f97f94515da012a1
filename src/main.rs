//! CGM glucose statistics
//!
//! Reads an exported series of CGM readings and prints derived statistics.
//!
//! Usage:
//!   dexstats stats [file]            - Print statistics as JSON
//!   dexstats report [file] [--mmol]  - Print a readable report
//!   dexstats --help                  - Show help
//!   DEXSTATS_DBG=1 dexstats stats    - Enable debug output

use std::env;
use std::path::PathBuf;

use log::{info, warn};

use dexstats::config::{config_file_path, get_data_dir, Config};
use dexstats::report::{bit_board, concise_message, verbose_message};
use dexstats::{DexStatsError, GlucoseUnit, JsonFileSource, ReadingCache, StatisticsEngine};

fn main() -> Result<(), DexStatsError> {
    let args: Vec<String> = env::args().collect();

    // Check for debug mode
    let debug_mode = env::var("DEXSTATS_DBG").is_ok();

    // Initialize logger
    if debug_mode {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    }

    // Create default config if it doesn't exist
    let cfg_path = config_file_path();
    if !cfg_path.exists() {
        if let Err(e) = Config::create_default(&cfg_path) {
            warn!("Could not create default config: {}", e);
        }
    }

    // Data directory first, then current directory
    let config = Config::load_first(&[cfg_path, PathBuf::from("config.txt")])?;

    let rest: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("stats") => cmd_stats(&config, &rest)?,
        Some("report") => cmd_report(&config, &rest)?,
        Some("range") => cmd_range(&config, &rest)?,
        Some("path") | Some("paths") => cmd_show_paths(),
        Some("--version") | Some("-V") => {
            println!("dexstats {}", env!("CARGO_PKG_VERSION"));
        }
        _ => print_help(),
    }

    Ok(())
}

/// Readings file from the first positional argument, else from config
fn readings_path(config: &Config, args: &[&str]) -> Result<PathBuf, DexStatsError> {
    args.iter()
        .find(|a| !a.starts_with("--"))
        .map(|a| PathBuf::from(*a))
        .or_else(|| config.readings_file.clone())
        .ok_or_else(|| DexStatsError::Config("no readings file given and none configured".to_string()))
}

/// Print the statistics bundle as JSON
fn cmd_stats(config: &Config, args: &[&str]) -> Result<(), DexStatsError> {
    let path = readings_path(config, args)?;
    info!("Computing statistics from {}", path.display());

    let cache = ReadingCache::new(JsonFileSource::new(&path), config.cache_config());
    let series = cache.get_readings(config.window_minutes, config.max_count)?;
    let bundle = StatisticsEngine::compute(&series, &config.threshold_policy()?)?;

    let json = serde_json::to_string_pretty(&bundle)?;
    println!("{}", json);
    Ok(())
}

/// Print a human-readable report
fn cmd_report(config: &Config, args: &[&str]) -> Result<(), DexStatsError> {
    let path = readings_path(config, args)?;
    let unit = if args.contains(&"--mmol") {
        GlucoseUnit::MmolL
    } else if args.contains(&"--mgdl") {
        GlucoseUnit::MgDl
    } else {
        config.units
    };

    let cache = ReadingCache::new(JsonFileSource::new(&path), config.cache_config());
    let series = cache.get_readings(config.window_minutes, config.max_count)?;
    let bundle = StatisticsEngine::compute(&series, &config.threshold_policy()?)?;

    println!("{}", verbose_message(&bundle, unit));
    println!();
    println!("{}", concise_message(&bundle, unit));
    println!();
    println!("{}", bit_board(&series, 5, 20));
    Ok(())
}

/// Validate a threshold range and show it in both units
fn cmd_range(config: &Config, args: &[&str]) -> Result<(), DexStatsError> {
    let [unit, low, high] = args else {
        return Err(DexStatsError::Config("usage: dexstats range <mgdl|mmol> <low> <high>".to_string()));
    };
    let unit: GlucoseUnit = unit.parse()?;
    let parse = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| DexStatsError::Config(format!("'{}' is not a number", s)))
    };

    let mut policy = config.threshold_policy()?;
    policy.set_range(unit, parse(*low)?, parse(*high)?)?;

    println!("Range: {} ({})", policy.format_range(GlucoseUnit::MgDl), policy.format_range(GlucoseUnit::MmolL));
    println!("Low:  {} mg/dL, {} mmol/L", policy.low_mgdl(), policy.low_mmol());
    println!("High: {} mg/dL, {} mmol/L", policy.high_mgdl(), policy.high_mmol());
    println!("Set low_mgdl/high_mgdl in {} to keep this range", config_file_path().display());
    Ok(())
}

/// Show data paths
fn cmd_show_paths() {
    println!("dexstats paths:");
    println!("  Data directory:  {}", get_data_dir().display());
    println!("  Config file:     {}", config_file_path().display());
}

fn print_help() {
    eprintln!("dexstats v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  dexstats stats [file]                 Print statistics as JSON");
    eprintln!("  dexstats report [file] [--mmol]       Print a readable report");
    eprintln!("  dexstats range <mgdl|mmol> <lo> <hi>  Check a threshold range");
    eprintln!("  dexstats path                         Show data file locations");
    eprintln!("  dexstats help                         Show this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("  DEXSTATS_DBG=1                        Enable debug output");
    eprintln!();
    eprintln!("CONFIG:");
    eprintln!("  {}", config_file_path().display());
}
