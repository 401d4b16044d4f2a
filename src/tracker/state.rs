use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UsageSession;
use crate::sensing::WindowSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerStatus {
    Idle,
    Tracking,
}

/// What a single tick did to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Probe gave nothing; the open session (if any) is left alone.
    NoSample,
    /// Same app as before.
    StillUsing { app_name: String, elapsed_ms: i64 },
    /// Focus moved to a different app. `closed` is the previous session if
    /// it was long enough to keep.
    Switched {
        from: Option<String>,
        to: String,
        closed: Option<UsageSession>,
    },
}

/// The open session, if any. Owned by the tracking loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub current_app: Option<String>,
    pub current_start_time: Option<DateTime<Utc>>,
    /// Title and path of the window that opened the session.
    pub current_title: String,
    pub current_path: String,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> TrackerStatus {
        match (&self.current_app, self.current_start_time) {
            (Some(_), Some(_)) => TrackerStatus::Tracking,
            _ => TrackerStatus::Idle,
        }
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.current_start_time
            .map(|start| (now - start).num_milliseconds())
    }

    /// Applies one probe result taken at `now`.
    pub fn observe(
        &mut self,
        sample: Option<&WindowSample>,
        now: DateTime<Utc>,
        min_session_ms: u64,
    ) -> TickOutcome {
        let Some(sample) = sample.filter(|s| !s.process_name.is_empty()) else {
            return TickOutcome::NoSample;
        };

        if self.current_app.as_deref() == Some(sample.process_name.as_str()) {
            return TickOutcome::StillUsing {
                app_name: sample.process_name.clone(),
                elapsed_ms: self.elapsed_ms(now).unwrap_or_default(),
            };
        }

        let from = self.current_app.clone();
        let closed = self.close(now, min_session_ms);

        self.current_app = Some(sample.process_name.clone());
        self.current_start_time = Some(now);
        self.current_title = sample.window_title.clone();
        self.current_path = sample.process_path.clone();

        TickOutcome::Switched {
            from,
            to: sample.process_name.clone(),
            closed,
        }
    }

    /// Ends the open session at `now` and goes idle.
    ///
    /// Returns the session only if it lasted strictly longer than
    /// `min_session_ms`; shorter ones are focus noise and are dropped.
    pub fn close(&mut self, now: DateTime<Utc>, min_session_ms: u64) -> Option<UsageSession> {
        let state = std::mem::take(self);
        let (app_name, start_time) = (state.current_app?, state.current_start_time?);

        let session = UsageSession::new(
            app_name,
            state.current_path,
            state.current_title,
            start_time,
            now,
        );

        (session.duration > min_session_ms).then_some(session)
    }
}
