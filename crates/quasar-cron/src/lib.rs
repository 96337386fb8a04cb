//! A cron trigger carrying a signed offset in seconds, composed with a 5-field base
//! cron expression (`minute hour dom month dow`).
//!
//! Grounded on the source's `OffsetCronTrigger`: for a negative offset the search
//! window is shifted forward by `|offset|` before asking the base cron for its next
//! fire time, then shifted back by the same amount — this is what keeps the result
//! strictly after `now` even when the *unshifted* base cron's next fire would land
//! before the desired offset instant.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum OffsetCronError {
    #[error("wrong number of cron fields; expected 5 (minute hour dom month dow), got {0}")]
    WrongFieldCount(usize),
    #[error(transparent)]
    Cron(#[from] cron::error::Error),
}

/// A 5-field cron expression plus a signed second offset applied to every fire instant.
pub struct OffsetCron {
    schedule: Schedule,
    offset_seconds: i64,
}

impl OffsetCron {
    /// Parses a standard 5-field crontab expression (`minute hour dom month dow`),
    /// internally widened to the 6-field (seconds-first) form `cron` expects.
    pub fn from_crontab(expr: &str, offset_seconds: i64) -> Result<Self, OffsetCronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(OffsetCronError::WrongFieldCount(fields.len()));
        }
        let six_field = format!(
            "0 {} {} {} {} {}",
            fields[0], fields[1], fields[2], fields[3], fields[4]
        );
        let schedule = Schedule::from_str(&six_field)?;
        Ok(Self {
            schedule,
            offset_seconds,
        })
    }

    /// The next instant strictly after `now`, shifted by this trigger's signed offset.
    /// Returns `None` when the base cron has no further firing.
    pub fn next(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.offset_seconds >= 0 {
            let base = self.schedule.after(&now).next()?;
            Some(base + Duration::seconds(self.offset_seconds))
        } else {
            let d = Duration::seconds(-self.offset_seconds);
            let base = self.schedule.after(&(now + d)).next()?;
            Some(base - d)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn positive_offset_daily_midnight_plus_six_hours() {
        let trig = OffsetCron::from_crontab("0 0 * * *", 6 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 14, 23, 0, 0).unwrap();
        let next = trig.next(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap());
    }

    #[test]
    fn negative_offset_daily_four_pm_minus_sixty_seconds() {
        let trig = OffsetCron::from_crontab("0 16 * * *", -60).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 14, 15, 0, 0).unwrap();
        let next = trig.next(now).unwrap();
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2024, 1, 14, 15, 59, 0).unwrap()
        );
    }

    #[test]
    fn result_is_always_strictly_after_now() {
        let trig = OffsetCron::from_crontab("*/5 * * * *", -30).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 4, 50).unwrap();
        let next = trig.next(now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(matches!(
            OffsetCron::from_crontab("0 0 * *", 0),
            Err(OffsetCronError::WrongFieldCount(4))
        ));
    }

    #[test]
    fn zero_offset_matches_plain_cron() {
        let trig = OffsetCron::from_crontab("30 9 * * MON", 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        let next = trig.next(now).unwrap();
        assert_eq!(next.format("%H:%M").to_string(), "09:30");
    }
}
