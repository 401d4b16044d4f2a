use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format::iso_date;

/// One closed interval during which a single application held focus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSession {
    /// Assigned by the usage store on append; `None` until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub app_name: String,
    #[serde(default)]
    pub app_path: String,
    #[serde(default)]
    pub window_title: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    /// Milliseconds, always `end_time - start_time`.
    pub duration: u64,
    /// Local calendar day of `end_time`, fixed when the session is closed.
    pub date: String,
}

impl UsageSession {
    pub fn new(
        app_name: impl Into<String>,
        app_path: impl Into<String>,
        window_title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let duration = (end_time - start_time).num_milliseconds().max(0) as u64;
        let date = iso_date(end_time.with_timezone(&Local).date_naive());

        Self {
            id: None,
            app_name: app_name.into(),
            app_path: app_path.into(),
            window_title: window_title.into(),
            start_time,
            end_time,
            duration,
            date,
        }
    }
}

/// On-disk shape of the usage log: `{ "sessions": [...] }`.
///
/// Anything else, `{}` included, fails to parse and is treated as corrupt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageLog {
    pub sessions: Vec<UsageSession>,
}
