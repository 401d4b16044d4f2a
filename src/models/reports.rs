//! Report shapes produced by the aggregator for the presentation layer.
//!
//! None of these are persisted; they are recomputed from the usage log on
//! every query.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Named relative window used by the per-app stats query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StatsRange {
    #[default]
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "7days")]
    SevenDays,
    #[serde(rename = "30days")]
    ThirtyDays,
}

impl StatsRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsRange::Today => "today",
            StatsRange::SevenDays => "7days",
            StatsRange::ThirtyDays => "30days",
        }
    }

    /// Days to look back from today; `None` means "today only".
    pub fn lookback_days(&self) -> Option<i64> {
        match self {
            StatsRange::Today => None,
            StatsRange::SevenDays => Some(7),
            StatsRange::ThirtyDays => Some(30),
        }
    }

    /// Lenient parse used by the query surface: unknown labels mean today.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            log::debug!("unknown stats range '{label}', falling back to today");
            StatsRange::Today
        })
    }
}

impl FromStr for StatsRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "today" => Ok(StatsRange::Today),
            "7days" => Ok(StatsRange::SevenDays),
            "30days" => Ok(StatsRange::ThirtyDays),
            other => Err(format!(
                "unknown range '{other}' (expected today, 7days or 30days)"
            )),
        }
    }
}

impl fmt::Display for StatsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-app totals for a stats range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub app_name: String,
    pub total_duration: u64,
    pub session_count: u64,
}

/// One day of the daily usage series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: String,
    pub total_time: u64,
    pub apps_breakdown: BTreeMap<String, u64>,
}

/// All-time ranking entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub app_name: String,
    pub total_duration: u64,
    pub active_days: u64,
    pub avg_session_duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_labels_round_trip_through_serde() {
        let json = serde_json::to_string(&StatsRange::SevenDays).unwrap();
        assert_eq!(json, "\"7days\"");
        let parsed: StatsRange = serde_json::from_str("\"30days\"").unwrap();
        assert_eq!(parsed, StatsRange::ThirtyDays);
    }

    #[test]
    fn strict_parse_rejects_unknown_labels() {
        assert_eq!("today".parse::<StatsRange>(), Ok(StatsRange::Today));
        assert!("yesterday".parse::<StatsRange>().is_err());
    }

    #[test]
    fn lenient_parse_falls_back_to_today() {
        assert_eq!(StatsRange::from_label("7days"), StatsRange::SevenDays);
        assert_eq!(StatsRange::from_label("fortnight"), StatsRange::Today);
        assert_eq!(StatsRange::from_label(""), StatsRange::Today);
    }
}
