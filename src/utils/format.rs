use chrono::{Duration, NaiveDate};

/// Calendar dates are stored and compared as `YYYY-MM-DD` strings.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn iso_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Human readable duration: `1h 5m`, `3m 12s`, `45s`.
///
/// The short form keeps only the largest unit (`1h`, `3m`) and renders
/// anything under a minute as `<1m`.
pub fn format_duration(ms: u64, short: bool) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if short {
        return if hours > 0 {
            format!("{hours}h")
        } else if minutes > 0 {
            format!("{minutes}m")
        } else {
            "<1m".to_string()
        };
    }

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

/// Clock style `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_duration_detailed(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    format!("{:02}:{:02}:{:02}", hours, minutes % 60, seconds % 60)
}

/// `(today - days, today)` as ISO date strings, ready for a daily usage query.
pub fn date_range(days: i64, today: NaiveDate) -> (String, String) {
    let start = today - Duration::days(days);
    (iso_date(start), iso_date(today))
}
