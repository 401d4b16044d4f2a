//! Grouping and sorting pipelines behind the three report queries.
//!
//! Every function here is a pure function of the session slice and its
//! parameters. Dates are compared as `YYYY-MM-DD` strings, which orders the
//! same way as the calendar.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate};

use crate::models::{AggregateRow, DailyUsage, RankingRow, StatsRange, UsageSession};
use crate::utils::format::iso_date;

/// Hard cap on the all-time ranking.
pub const MAX_RANKINGS: usize = 20;

/// Per-app totals for `range`, busiest app first.
///
/// Apps with equal totals keep the order in which they first appear in
/// `sessions`.
pub fn app_stats(
    sessions: &[UsageSession],
    range: StatsRange,
    today: NaiveDate,
) -> Vec<AggregateRow> {
    let today_str = iso_date(today);
    let lower_bound = range
        .lookback_days()
        .map(|days| iso_date(today - Duration::days(days)));

    let in_range = |session: &&UsageSession| match &lower_bound {
        None => session.date == today_str,
        Some(bound) => session.date.as_str() >= bound.as_str(),
    };

    let mut rows: Vec<AggregateRow> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for session in sessions.iter().filter(in_range) {
        let slot = *index.entry(session.app_name.as_str()).or_insert_with(|| {
            rows.push(AggregateRow {
                app_name: session.app_name.clone(),
                total_duration: 0,
                session_count: 0,
            });
            rows.len() - 1
        });

        let row = &mut rows[slot];
        row.total_duration += session.duration;
        row.session_count += 1;
    }

    rows.sort_by(|a, b| b.total_duration.cmp(&a.total_duration));
    rows
}

/// Daily totals with a per-app breakdown for `start_date..=end_date`.
///
/// Only days that have at least one session are returned; callers must not
/// assume a dense series.
pub fn daily_usage(sessions: &[UsageSession], start_date: &str, end_date: &str) -> Vec<DailyUsage> {
    let mut days: BTreeMap<&str, DailyUsage> = BTreeMap::new();

    for session in sessions
        .iter()
        .filter(|s| s.date.as_str() >= start_date && s.date.as_str() <= end_date)
    {
        let day = days.entry(session.date.as_str()).or_insert_with(|| DailyUsage {
            date: session.date.clone(),
            total_time: 0,
            apps_breakdown: BTreeMap::new(),
        });

        day.total_time += session.duration;
        *day
            .apps_breakdown
            .entry(session.app_name.clone())
            .or_insert(0) += session.duration;
    }

    // BTreeMap iteration is already ascending by date.
    days.into_values().collect()
}

struct RankingAccumulator<'a> {
    app_name: &'a str,
    total_duration: u64,
    active_days: HashSet<&'a str>,
    durations: Vec<u64>,
}

/// All-time ranking by cumulative focus time, capped at [`MAX_RANKINGS`].
pub fn app_rankings(sessions: &[UsageSession]) -> Vec<RankingRow> {
    let mut groups: Vec<RankingAccumulator<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for session in sessions {
        let slot = *index.entry(session.app_name.as_str()).or_insert_with(|| {
            groups.push(RankingAccumulator {
                app_name: session.app_name.as_str(),
                total_duration: 0,
                active_days: HashSet::new(),
                durations: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.total_duration += session.duration;
        group.active_days.insert(session.date.as_str());
        group.durations.push(session.duration);
    }

    let mut rows: Vec<RankingRow> = groups
        .into_iter()
        .map(|group| {
            let avg_session_duration = if group.durations.is_empty() {
                0.0
            } else {
                group.durations.iter().sum::<u64>() as f64 / group.durations.len() as f64
            };

            RankingRow {
                app_name: group.app_name.to_string(),
                total_duration: group.total_duration,
                active_days: group.active_days.len() as u64,
                avg_session_duration,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total_duration.cmp(&a.total_duration));
    rows.truncate(MAX_RANKINGS);
    rows
}
