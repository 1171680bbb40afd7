//! Weekday schedule for the daily report.
//!
//! Fires once a day at a fixed local wall-clock time. Saturdays and Sundays
//! are skipped.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Daily weekday trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrigger {
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_hour() -> u32 {
    8
}

fn default_utc_offset_hours() -> i32 {
    -6
}

impl Default for DailyTrigger {
    fn default() -> Self {
        Self {
            hour: default_hour(),
            minute: 0,
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl DailyTrigger {
    pub fn new(hour: u32, minute: u32, utc_offset_hours: i32) -> EngineResult<Self> {
        let trigger = Self {
            hour,
            minute,
            utc_offset_hours,
        };
        trigger.validate()?;
        Ok(trigger)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.offset()?;
        self.time()?;
        Ok(())
    }

    fn offset(&self) -> EngineResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            EngineError::Config(format!("Invalid UTC offset: {} hours", self.utc_offset_hours))
        })
    }

    fn time(&self) -> EngineResult<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).ok_or_else(|| {
            EngineError::Config(format!("Invalid trigger time {:02}:{:02}", self.hour, self.minute))
        })
    }

    /// First firing strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> EngineResult<DateTime<Utc>> {
        let offset = self.offset()?;
        let time = self.time()?;
        let local_after = after.with_timezone(&offset);

        let mut date = local_after.date_naive();
        if local_after.time() >= time {
            date += Duration::days(1);
        }
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += Duration::days(1);
        }

        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|fire| fire.with_timezone(&Utc))
            .ok_or_else(|| EngineError::Internal(format!("No local time {} {}", date, time)))
    }

    /// Time left until the next firing.
    pub fn until_next(&self, now: DateTime<Utc>) -> EngineResult<std::time::Duration> {
        let next = self.next_fire(now)?;
        Ok((next - now).to_std().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_fires_later_same_day() {
        let trigger = DailyTrigger::new(8, 30, -6).unwrap();
        // Wednesday 2026-10-14 06:00 local.
        let next = trigger.next_fire(utc("2026-10-14T12:00:00Z")).unwrap();
        assert_eq!(next, utc("2026-10-14T14:30:00Z"));
    }

    #[test]
    fn test_fires_next_day_once_passed() {
        let trigger = DailyTrigger::new(8, 30, -6).unwrap();
        let next = trigger.next_fire(utc("2026-10-14T14:30:00Z")).unwrap();
        assert_eq!(next, utc("2026-10-15T14:30:00Z"));
    }

    #[test]
    fn test_skips_weekend() {
        let trigger = DailyTrigger::new(8, 0, -6).unwrap();
        // Friday 2026-10-16 09:00 local: next is Monday.
        let next = trigger.next_fire(utc("2026-10-16T15:00:00Z")).unwrap();
        assert_eq!(next, utc("2026-10-19T14:00:00Z"));

        // Saturday evening UTC is still Saturday locally.
        let next = trigger.next_fire(utc("2026-10-17T20:00:00Z")).unwrap();
        assert_eq!(next, utc("2026-10-19T14:00:00Z"));
    }

    #[test]
    fn test_local_date_differs_from_utc() {
        let trigger = DailyTrigger::new(20, 0, -6).unwrap();
        // Tuesday 01:00 UTC is Monday 19:00 local.
        let next = trigger.next_fire(utc("2026-10-13T01:00:00Z")).unwrap();
        assert_eq!(next, utc("2026-10-13T02:00:00Z"));
    }

    #[test]
    fn test_until_next() {
        let trigger = DailyTrigger::new(8, 0, 0).unwrap();
        let wait = trigger.until_next(utc("2026-10-14T07:00:00Z")).unwrap();
        assert_eq!(wait, std::time::Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_trigger() {
        assert!(DailyTrigger::new(24, 0, 0).is_err());
        assert!(DailyTrigger::new(8, 60, 0).is_err());
        assert!(DailyTrigger::new(8, 0, 30).is_err());
    }

    #[test]
    fn test_defaults_from_yaml() {
        let trigger: DailyTrigger = serde_yaml::from_str("minute: 15").unwrap();
        assert_eq!(trigger, DailyTrigger { hour: 8, minute: 15, utc_offset_hours: -6 });
    }
}
