use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{Local, NaiveDate};
use log::{info, warn};
use serde::Serialize;

use crate::aggregator;
use crate::models::{AggregateRow, DailyUsage, RankingRow, StatsRange, UsageLog, UsageSession};

use super::{BlobStore, StoreError};

#[derive(Serialize)]
struct UsageLogRef<'a> {
    sessions: &'a [UsageSession],
}

/// Append-only usage log, held in memory and mirrored to a [`BlobStore`].
///
/// Readers take a shared lock on the in-memory sequence, so a query running
/// during an append sees the log either before or after the new session.
pub struct UsageStore {
    backend: Box<dyn BlobStore>,
    sessions: RwLock<Vec<UsageSession>>,
    // Serializes appends and flushes so snapshots reach the backend in order.
    write_gate: Mutex<()>,
}

impl UsageStore {
    /// Loads whatever the backend holds.
    ///
    /// Never fails: unreadable or corrupt data is logged, copied aside when
    /// the backend supports it, and replaced by an empty log that the next
    /// successful write will overwrite.
    pub fn open(backend: Box<dyn BlobStore>) -> Self {
        let location = backend.describe();
        let mut initialize = false;

        let sessions = match backend.read_all() {
            Ok(Some(bytes)) => match serde_json::from_slice::<UsageLog>(&bytes) {
                Ok(log) => {
                    info!(
                        "Loaded {} existing usage records from {}",
                        log.sessions.len(),
                        location
                    );
                    log.sessions
                }
                Err(err) => {
                    warn!("Usage data at {location} is corrupt ({err}); starting with an empty log");
                    match backend.preserve(&bytes) {
                        Ok(Some(backup)) => warn!("Unreadable usage data copied to {backup}"),
                        Ok(None) => {}
                        Err(err) => warn!("Could not back up unreadable usage data: {err}"),
                    }
                    Vec::new()
                }
            },
            Ok(None) => {
                initialize = true;
                Vec::new()
            }
            Err(err) => {
                warn!("{err}; starting with an empty log");
                Vec::new()
            }
        };

        let store = Self {
            backend,
            sessions: RwLock::new(sessions),
            write_gate: Mutex::new(()),
        };

        if initialize {
            match store.flush() {
                Ok(()) => info!("Initialized empty usage log at {location}"),
                Err(err) => warn!("Could not initialize usage log at {location}: {err}"),
            }
        }

        store
    }

    /// Stores `session` under the next id and persists the whole log.
    ///
    /// The in-memory append is kept even when persisting fails, so memory and
    /// disk can diverge until the next successful write. Callers that need
    /// durability should retry [`UsageStore::flush`].
    pub fn append(&self, session: UsageSession) -> Result<UsageSession, StoreError> {
        if session.app_name.is_empty() {
            return Err(StoreError::InvalidSession("app name is empty".into()));
        }
        if session.duration == 0 {
            return Err(StoreError::InvalidSession(format!(
                "session for {} has zero duration",
                session.app_name
            )));
        }

        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let mut stored = session;
            stored.id = Some(sessions.len() as u64 + 1);
            sessions.push(stored.clone());
            stored
        };

        self.persist()?;
        Ok(stored)
    }

    /// All sessions in insertion order.
    pub fn load_all(&self) -> Vec<UsageSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the current log to the backend. Safe to call repeatedly.
    pub fn flush(&self) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist()
    }

    /// Final flush on shutdown.
    pub fn close(&self) -> Result<(), StoreError> {
        self.flush()?;
        info!("Usage store closed ({} records)", self.len());
        Ok(())
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn app_stats(&self, range: StatsRange) -> Vec<AggregateRow> {
        self.app_stats_on(range, Local::now().date_naive())
    }

    pub fn app_stats_on(&self, range: StatsRange, today: NaiveDate) -> Vec<AggregateRow> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        aggregator::app_stats(&sessions, range, today)
    }

    pub fn daily_usage(&self, start_date: &str, end_date: &str) -> Vec<DailyUsage> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        aggregator::daily_usage(&sessions, start_date, end_date)
    }

    pub fn app_rankings(&self) -> Vec<RankingRow> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        aggregator::app_rankings(&sessions)
    }

    // Caller holds `write_gate`.
    fn persist(&self) -> Result<(), StoreError> {
        let bytes = {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_vec_pretty(&UsageLogRef {
                sessions: &sessions,
            })?
        };
        self.backend.write_all(&bytes)
    }
}
