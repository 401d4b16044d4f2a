use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use log::{info, warn};
use serde::Serialize;
use std::fmt::Write as _;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::models::{AggregateRow, DailyUsage, RankingRow, StatsRange};
use crate::sensing::strategies::platform_chain;
use crate::settings::{SettingsStore, TrackerSettings};
use crate::storage::{BlobStore, FileBlobStore, SqliteBlobStore, StorageBackend, UsageStore};
use crate::tracker::TrackerController;
use crate::utils::{date_range, format::iso_date, format_duration, format_duration_detailed};

pub const JSON_FILE: &str = "pc_timer.json";
pub const SQLITE_FILE: &str = "pc_timer.sqlite3";

/// Days shown by `daily` when no range is given.
pub const DEFAULT_DAILY_DAYS: i64 = 7;

/// Apps listed per day in the human daily table.
const DAILY_TOP_APPS: usize = 3;

pub fn open_store(data_dir: &Path, backend: StorageBackend) -> Result<UsageStore> {
    let blob_store: Box<dyn BlobStore> = match backend {
        StorageBackend::Json => Box::new(FileBlobStore::new(data_dir.join(JSON_FILE))),
        StorageBackend::Sqlite => Box::new(
            SqliteBlobStore::open(data_dir.join(SQLITE_FILE))
                .context("failed to open sqlite usage store")?,
        ),
    };
    Ok(UsageStore::open(blob_store))
}

/// Tracks the foreground app until Ctrl-C, then saves the open session.
pub async fn track(store: Arc<UsageStore>, settings: TrackerSettings) -> Result<()> {
    let probe = platform_chain(settings.probe_timeout());
    if probe.is_empty() {
        warn!("No window probe is available on this platform; nothing will be recorded");
    }

    let controller = TrackerController::new(Arc::new(probe), store, settings);
    info!("Press Ctrl-C to stop tracking");
    track_until(controller, tokio::signal::ctrl_c()).await
}

/// Runs `controller` until `shutdown` resolves.
///
/// The store is closed even when stopping the loop fails, so a session kept
/// in memory after an earlier failed write still gets flushed.
pub async fn track_until<F>(mut controller: TrackerController, shutdown: F) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    controller.start()?;
    let started = std::time::Instant::now();

    let signal = shutdown.await.context("failed to listen for shutdown signal");
    let stopped = controller.stop().await;
    info!(
        "Tracked for {}",
        format_duration_detailed(started.elapsed().as_millis() as u64)
    );

    let store = Arc::clone(controller.store());
    let closed = tokio::task::spawn_blocking(move || store.close())
        .await
        .context("store close worker join failed")
        .and_then(|result| result.context("failed to flush usage store"));

    stopped?;
    signal?;
    closed
}

/// Fields `pctimer config` can change; unset flags keep the stored value.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct SettingsChanges {
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long)]
    pub min_session_ms: Option<u64>,
    #[arg(long)]
    pub probe_timeout_ms: Option<u64>,
    #[arg(long)]
    pub tick_timeout_ms: Option<u64>,
    /// Backend used by later runs
    #[arg(long)]
    pub storage_backend: Option<StorageBackend>,
}

impl SettingsChanges {
    pub fn is_empty(&self) -> bool {
        self.poll_interval_ms.is_none()
            && self.min_session_ms.is_none()
            && self.probe_timeout_ms.is_none()
            && self.tick_timeout_ms.is_none()
            && self.storage_backend.is_none()
    }

    pub fn apply(&self, mut settings: TrackerSettings) -> TrackerSettings {
        if let Some(ms) = self.poll_interval_ms {
            settings.poll_interval_ms = ms;
        }
        if let Some(ms) = self.min_session_ms {
            settings.min_session_ms = ms;
        }
        if let Some(ms) = self.probe_timeout_ms {
            settings.probe_timeout_ms = ms;
        }
        if let Some(ms) = self.tick_timeout_ms {
            settings.tick_timeout_ms = ms;
        }
        if let Some(backend) = self.storage_backend {
            settings.storage_backend = backend;
        }
        settings
    }
}

/// Applies `changes` (if any) to `settings.json` and returns what is now stored.
pub fn configure(store: &SettingsStore, changes: &SettingsChanges) -> Result<TrackerSettings> {
    if !changes.is_empty() {
        store.update_tracker(changes.apply(store.tracker()))?;
        info!("Settings saved to {}", store.path().display());
    }
    Ok(store.tracker())
}

pub fn render_settings(settings: &TrackerSettings, path: &Path) -> Result<String> {
    Ok(format!("Settings at {}\n{}\n", path.display(), to_json(settings)?))
}

/// Inclusive `(start, end)` for the daily query, defaulting to the last week.
pub fn daily_bounds(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> (String, String) {
    let (default_start, default_end) = date_range(DEFAULT_DAILY_DAYS, today);
    (
        start.map(iso_date).unwrap_or(default_start),
        end.map(iso_date).unwrap_or(default_end),
    )
}

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn to_json<T: Serialize + ?Sized>(report: &T) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report")
}

pub fn render_stats(rows: &[AggregateRow], range: StatsRange) -> String {
    let mut out = format!("App usage ({range})\n");
    if rows.is_empty() {
        out.push_str("  no sessions recorded\n");
        return out;
    }

    let width = name_width(rows.iter().map(|row| row.app_name.as_str()));
    for row in rows {
        let _ = writeln!(
            out,
            "  {:<width$}  {:>8}  {} session{}",
            row.app_name,
            format_duration(row.total_duration, false),
            row.session_count,
            if row.session_count == 1 { "" } else { "s" },
        );
    }

    let total: u64 = rows.iter().map(|row| row.total_duration).sum();
    let _ = writeln!(out, "Total: {}", format_duration(total, false));
    out
}

pub fn render_daily(days: &[DailyUsage], start: &str, end: &str) -> String {
    let mut out = format!("Daily usage {start} .. {end}\n");
    if days.is_empty() {
        out.push_str("  no sessions recorded\n");
        return out;
    }

    for day in days {
        let mut apps: Vec<(&String, &u64)> = day.apps_breakdown.iter().collect();
        apps.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let top = apps
            .iter()
            .take(DAILY_TOP_APPS)
            .map(|(name, ms)| format!("{name} {}", format_duration(**ms, true)))
            .collect::<Vec<_>>()
            .join(", ");

        let _ = writeln!(
            out,
            "  {}  {:>8}  {top}",
            day.date,
            format_duration(day.total_time, false)
        );
    }

    let total: u64 = days.iter().map(|day| day.total_time).sum();
    let _ = writeln!(out, "Total: {}", format_duration(total, false));
    out
}

pub fn render_rankings(rows: &[RankingRow]) -> String {
    let mut out = String::from("All-time rankings\n");
    if rows.is_empty() {
        out.push_str("  no sessions recorded\n");
        return out;
    }

    let width = name_width(rows.iter().map(|row| row.app_name.as_str()));
    for (rank, row) in rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>2}. {:<width$}  {:>8}  {} day{}  avg {}",
            rank + 1,
            row.app_name,
            format_duration(row.total_duration, false),
            row.active_days,
            if row.active_days == 1 { "" } else { "s" },
            format_duration(row.avg_session_duration.round() as u64, false),
        );
    }
    out
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(|name| name.chars().count()).max().unwrap_or(0)
}
