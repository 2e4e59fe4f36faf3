//! Daily and weekly calorie rollups over a history snapshot.
//!
//! Everything here is a pure function of its arguments. Calendar days are
//! taken in the supplied UTC offset, midnight to midnight.

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, UtcOffset, Weekday};

use super::model::History;
use crate::config::Language;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    pub date: String,
    pub label: &'static str,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayProgress {
    pub date: String,
    pub total: f64,
    pub target: f64,
    /// Percent of target reached, capped at 100.
    pub progress_pct: f64,
    pub remaining: f64,
}

fn local_date(at: OffsetDateTime, offset: UtcOffset) -> Date {
    at.to_offset(offset).date()
}

pub fn weekday_label(day: Weekday, language: Language) -> &'static str {
    match language {
        Language::Zh => match day {
            Weekday::Monday => "周一",
            Weekday::Tuesday => "周二",
            Weekday::Wednesday => "周三",
            Weekday::Thursday => "周四",
            Weekday::Friday => "周五",
            Weekday::Saturday => "周六",
            Weekday::Sunday => "周日",
        },
        Language::En => match day {
            Weekday::Monday => "Mon",
            Weekday::Tuesday => "Tue",
            Weekday::Wednesday => "Wed",
            Weekday::Thursday => "Thu",
            Weekday::Friday => "Fri",
            Weekday::Saturday => "Sat",
            Weekday::Sunday => "Sun",
        },
    }
}

pub fn daily_total(history: &History, date: Date, offset: UtcOffset) -> f64 {
    history
        .records()
        .iter()
        .filter(|r| local_date(r.timestamp(), offset) == date)
        .map(|r| r.total_calories())
        .sum()
}

/// The `n` local days ending on the day of `reference`, oldest first.
fn trailing_dates(
    n: usize,
    reference: OffsetDateTime,
    offset: UtcOffset,
) -> impl Iterator<Item = Date> {
    let last = local_date(reference, offset);
    (0..n)
        .rev()
        .filter_map(move |back| last.checked_sub(Duration::days(back as i64)))
}

/// Totals for the `n` days ending on the local day of `reference`, oldest first.
pub fn trailing_daily_totals(
    history: &History,
    n: usize,
    reference: OffsetDateTime,
    offset: UtcOffset,
    language: Language,
) -> Vec<DailyTotal> {
    trailing_dates(n, reference, offset)
        .map(|date| DailyTotal {
            date: date.to_string(),
            label: weekday_label(date.weekday(), language),
            total: daily_total(history, date, offset),
        })
        .collect()
}

/// Mean over all `n` days, empty days included as zero. Zero when `n == 0`.
pub fn average_daily_total(
    history: &History,
    n: usize,
    reference: OffsetDateTime,
    offset: UtcOffset,
) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = trailing_dates(n, reference, offset)
        .map(|date| daily_total(history, date, offset))
        .sum();
    sum / n as f64
}

pub fn today_progress(
    history: &History,
    target: f64,
    now: OffsetDateTime,
    offset: UtcOffset,
) -> TodayProgress {
    let today = local_date(now, offset);
    let total = daily_total(history, today, offset);
    let progress_pct = if target > 0.0 {
        (total / target * 100.0).min(100.0)
    } else {
        100.0
    };
    TodayProgress {
        date: today.to_string(),
        total,
        target,
        progress_pct,
        remaining: (target - total).max(0.0),
    }
}
