// Coarse "N units ago" strings for display next to build dates.

use std::time::Duration;

use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: u64 = 86_400;

// At or below this many seconds the singular template is used.
const MAX_SECONDS_FOR_JUST_NOW: u64 = 10;

/// Render an elapsed duration using the largest unit that applies.
///
/// Years are rounded to the nearest whole year; months are days / 30
/// rounded up, except that an exact multiple of 31 days is not bumped.
pub fn humanize_elapsed(delay: Duration) -> String {
    let total = delay.as_secs();
    let days = total / SECONDS_PER_DAY;
    let hours = (total % SECONDS_PER_DAY) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 365 {
        let years = (days as f64 / 365.0).round() as u64;
        return ago(years, "year");
    }

    if days > 30 {
        let mut months = days / 30;
        if days % 31 != 0 {
            months += 1;
        }
        return ago(months, "month");
    }

    if days > 0 {
        return ago(days, "day");
    }
    if hours > 0 {
        return ago(hours, "hour");
    }
    if minutes > 0 {
        return ago(minutes, "minute");
    }

    if seconds > MAX_SECONDS_FOR_JUST_NOW {
        format!("{} seconds ago", seconds)
    } else {
        format!("{} second ago", seconds)
    }
}

/// Elapsed time from `since` to `now`; timestamps in the future read as
/// zero elapsed.
pub fn time_ago(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    humanize_elapsed((now - since).to_std().unwrap_or(Duration::ZERO))
}

fn ago(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {} ago", count, unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}
