//! Live Collector (§4.G): WebSocket session lifecycle, bounded listen window,
//! last-bar-per-symbol selection.
//!
//! Grounded on `providers/core.py`'s `get_live`/`get_next_interval_timestamp`: the
//! bar-end/cutoff arithmetic and the discard-if-`ts > bar_end` rule are normative.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use quasar_core::bar::{Bar, Interval};
use quasar_core::error::ProviderError;
use quasar_core::provider::LiveProvider;
use std::collections::HashMap;
use std::sync::Arc;

/// The next UTC instant on the grid implied by `interval`, rolled over day/week/month
/// boundaries as needed. The weekly grid is Monday-aligned.
pub fn next_interval_boundary(interval: Interval, now: DateTime<Utc>) -> DateTime<Utc> {
    match interval {
        Interval::OneMinute => truncate_to_minute(now) + Duration::minutes(1),
        Interval::FiveMinutes => next_minute_mark(now, 5),
        Interval::FifteenMinutes => next_minute_mark(now, 15),
        Interval::ThirtyMinutes => next_minute_mark(now, 30),
        Interval::OneHour => truncate_to_hour(now) + Duration::hours(1),
        Interval::FourHours => next_hour_mark(now, 4),
        Interval::OneDay => truncate_to_day(now) + Duration::days(1),
        Interval::OneWeek => {
            let days_to_monday = (7 - now.weekday().num_days_from_monday() as i64) % 7;
            let days_to_monday = if days_to_monday == 0 { 7 } else { days_to_monday };
            truncate_to_day(now) + Duration::days(days_to_monday)
        }
        Interval::OneMonth => {
            let (year, month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
        }
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(t.hour(), t.minute(), 0)
        .unwrap()
        .and_utc()
}

fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_hms_opt(t.hour(), 0, 0).unwrap().and_utc()
}

fn truncate_to_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn next_minute_mark(t: DateTime<Utc>, step: u32) -> DateTime<Utc> {
    let next = ((t.minute() / step) + 1) * step;
    if next == 60 {
        truncate_to_hour(t) + Duration::hours(1)
    } else {
        truncate_to_hour(t) + Duration::minutes(next as i64)
    }
}

fn next_hour_mark(t: DateTime<Utc>, step: u32) -> DateTime<Utc> {
    let next = ((t.hour() / step) + 1) * step;
    if next == 24 {
        truncate_to_day(t) + Duration::days(1)
    } else {
        truncate_to_day(t) + Duration::hours(next as i64)
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LiveJobError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("live collection timed out")]
    Timeout,
}

/// Runs one live-collector firing under an overall deadline. Returns one bar per
/// symbol that actually reported in the listen window; missing symbols are logged,
/// not failed. `post_close_seconds` is the registry-preference-controlled width of
/// the listen window past the bar-close grid instant (§4.H `scheduling.post_close_seconds`).
pub async fn run_live_job(
    provider: Arc<dyn LiveProvider>,
    interval: Interval,
    symbols: Vec<String>,
    post_close_seconds: u64,
    timeout_seconds: u64,
) -> Result<Vec<Bar>, LiveJobError> {
    let fut = collect_live(provider, interval, symbols, post_close_seconds);
    match tokio::time::timeout(std::time::Duration::from_secs(timeout_seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(LiveJobError::Timeout),
    }
}

async fn collect_live(
    provider: Arc<dyn LiveProvider>,
    interval: Interval,
    symbols: Vec<String>,
    post_close_seconds: u64,
) -> Result<Vec<Bar>, LiveJobError> {
    let bar_end = next_interval_boundary(interval, Utc::now());
    let cutoff = bar_end + Duration::seconds(post_close_seconds as i64);

    let mut session = provider.connect().await?;
    let result = async {
        session.subscribe(interval, &symbols).await?;

        let mut latest: HashMap<String, Bar> = HashMap::new();
        loop {
            if Utc::now() >= cutoff {
                break;
            }
            let Some(message) = session.recv().await else {
                break;
            };
            let bars = match session.parse_message(&message) {
                Ok(bars) => bars,
                Err(_) => continue,
            };
            for bar in bars {
                if bar.ts > bar_end {
                    continue;
                }
                latest.insert(bar.sym.clone(), bar);
            }
        }

        session.unsubscribe(&symbols).await?;
        Ok::<_, ProviderError>(latest)
    }
    .await;

    let latest = result?;

    let missing: Vec<&String> = symbols.iter().filter(|s| !latest.contains_key(*s)).collect();
    if !missing.is_empty() {
        tracing::warn!(?missing, "did not receive bars for all subscribed symbols");
    }

    Ok(latest.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn one_minute_boundary_rolls_to_next_minute() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 15).unwrap();
        assert_eq!(
            next_interval_boundary(Interval::OneMinute, now),
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 31, 0).unwrap()
        );
    }

    #[test]
    fn five_minute_boundary_rolls_hour() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 58, 0).unwrap();
        assert_eq!(
            next_interval_boundary(Interval::FiveMinutes, now),
            Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap()
        );
    }

    #[test]
    fn four_hour_boundary_rolls_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap();
        assert_eq!(
            next_interval_boundary(Interval::FourHours, now),
            Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekly_boundary_is_next_monday() {
        // 2024-06-01 is a Saturday.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let next = next_interval_boundary(Interval::OneWeek, now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn monthly_boundary_wraps_december() {
        let now = Utc.with_ymd_and_hms(2024, 12, 15, 0, 0, 0).unwrap();
        assert_eq!(
            next_interval_boundary(Interval::OneMonth, now),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
