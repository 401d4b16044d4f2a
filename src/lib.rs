pub mod aggregator;
pub mod commands;
pub mod db;
pub mod models;
pub mod sensing;
pub mod settings;
pub mod storage;
pub mod tracker;
pub mod utils;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use models::StatsRange;
use settings::SettingsStore;
use storage::StorageBackend;

const DATA_DIR_ENV: &str = "PCTIMER_DATA_DIR";
const DEBUG_ENV: &str = "PCTIMER_DEBUG";
const APP_DIR_NAME: &str = "pc-timer";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Parser)]
#[command(name = "pctimer", version, about = "Per-application usage tracker")]
pub struct Cli {
    /// Where settings and usage data live (overrides PCTIMER_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend for the usage log (overrides settings.json)
    #[arg(long, global = true)]
    pub backend: Option<StorageBackend>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record foreground app usage until Ctrl-C
    Track,
    /// Per-app totals for a relative range
    Stats {
        /// today, 7days or 30days; anything else means today
        #[arg(long, default_value = "today")]
        range: String,
    },
    /// Per-day totals with a per-app breakdown
    Daily {
        /// First day, YYYY-MM-DD (default: a week ago)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD (default: today)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// All-time top apps
    Rankings,
    /// Show settings.json, or change it with the flags below
    Config(commands::SettingsChanges),
}

pub async fn run(cli: Cli) -> Result<()> {
    // RUST_LOG still wins over the default level.
    let default_level = if std::env::var_os(DEBUG_ENV).is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    let data_dir = resolve_data_dir(cli.data_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
    if let Command::Config(changes) = &cli.command {
        let saved = commands::configure(&settings_store, changes)?;
        return print_report(cli.json, &saved, || {
            commands::render_settings(&saved, settings_store.path())
        });
    }

    let mut settings = settings_store.tracker();
    if let Some(backend) = cli.backend {
        settings.storage_backend = backend;
    }

    log::debug!(
        "pctimer starting (data dir {}, backend {})",
        data_dir.display(),
        settings.storage_backend.as_str()
    );

    let store = Arc::new(commands::open_store(&data_dir, settings.storage_backend)?);

    match cli.command {
        Command::Track => commands::track(store, settings).await,
        Command::Stats { range } => {
            let range = StatsRange::from_label(&range);
            let rows = store.app_stats(range);
            print_report(cli.json, &rows, || Ok(commands::render_stats(&rows, range)))
        }
        Command::Daily { start, end } => {
            let (start, end) = commands::daily_bounds(start, end, commands::local_today());
            let days = store.daily_usage(&start, &end);
            print_report(cli.json, &days, || Ok(commands::render_daily(&days, &start, &end)))
        }
        Command::Rankings => {
            let rows = store.app_rankings();
            print_report(cli.json, &rows, || Ok(commands::render_rankings(&rows)))
        }
        // Handled before the store is opened.
        Command::Config(_) => Ok(()),
    }
}

fn print_report<T: serde::Serialize>(
    json: bool,
    report: &T,
    render: impl FnOnce() -> Result<String>,
) -> Result<()> {
    if json {
        println!("{}", commands::to_json(report)?);
    } else {
        print!("{}", render()?);
    }
    Ok(())
}

/// `--data-dir`, then `PCTIMER_DATA_DIR`, then the platform data directory.
fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .context("could not determine a data directory; pass --data-dir")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_report_flags() {
        let cli = Cli::try_parse_from([
            "pctimer", "--json", "--backend", "sqlite", "stats", "--range", "30days",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.backend, Some(StorageBackend::Sqlite));
        match cli.command {
            Command::Stats { range } => {
                assert_eq!(StatsRange::from_label(&range), StatsRange::ThirtyDays)
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_range_is_accepted_and_means_today() {
        let cli = Cli::try_parse_from(["pctimer", "stats", "--range", "yesterday"]).unwrap();
        match cli.command {
            Command::Stats { range } => {
                assert_eq!(StatsRange::from_label(&range), StatsRange::Today)
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_config_changes() {
        let cli = Cli::try_parse_from([
            "pctimer",
            "config",
            "--min-session-ms",
            "0",
            "--storage-backend",
            "sqlite",
        ])
        .unwrap();
        match cli.command {
            Command::Config(changes) => {
                assert_eq!(changes.min_session_ms, Some(0));
                assert_eq!(changes.storage_backend, Some(StorageBackend::Sqlite));
                assert!(changes.poll_interval_ms.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parses_daily_dates() {
        let cli = Cli::try_parse_from(["pctimer", "daily", "--start", "2024-01-01"]).unwrap();
        match cli.command {
            Command::Daily { start, end } => {
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(end, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn explicit_data_dir_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/pctimer-test"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/pctimer-test"));
    }
}
