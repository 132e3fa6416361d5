//! Day source for the daily buckets.
//!
//! The registry never reads the wall clock directly; it asks a `Clock` for
//! today's calendar date so hosts can pick the zone and tests can move time.

use chrono::{Local, NaiveDate, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;

/// Format of the `time` key on a daily bucket.
pub const DAY_KEY_FORMAT: &str = "%Y%m%d";

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Today's bucket key, `YYYYMMDD`.
    fn day_key(&self) -> String {
        self.today().format(DAY_KEY_FORMAT).to_string()
    }
}

/// Which calendar decides where a day ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DayZone {
    #[default]
    Local,
    Utc,
}

impl fmt::Display for DayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayZone::Local => write!(f, "local"),
            DayZone::Utc => write!(f, "utc"),
        }
    }
}

impl FromStr for DayZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DayZone::Local),
            "utc" => Ok(DayZone::Utc),
            other => Err(format!("unknown day zone '{}' (expected local or utc)", other)),
        }
    }
}

/// Host wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub zone: DayZone,
}

impl SystemClock {
    pub fn new(zone: DayZone) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.zone {
            DayZone::Local => Local::now().date_naive(),
            DayZone::Utc => Utc::now().date_naive(),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    day: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: Mutex::new(day),
        }
    }

    pub fn set(&self, day: NaiveDate) {
        *self.day.lock() = day;
    }

    /// Move forward by `days` calendar days.
    pub fn advance(&self, days: u64) {
        let mut day = self.day.lock();
        if let Some(next) = day.checked_add_days(chrono::Days::new(days)) {
            *day = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.day.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_format() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(clock.day_key(), "20240309");
    }

    #[test]
    fn test_advance_crosses_month() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        clock.advance(2);
        assert_eq!(clock.day_key(), "20240301");
    }

    #[test]
    fn test_day_zone_parse() {
        assert_eq!("local".parse::<DayZone>().unwrap(), DayZone::Local);
        assert_eq!(" UTC ".parse::<DayZone>().unwrap(), DayZone::Utc);
        assert!("mars".parse::<DayZone>().is_err());
    }

    #[test]
    fn test_system_clock_key_shape() {
        let key = SystemClock::new(DayZone::Utc).day_key();
        assert_eq!(key.len(), 8);
        assert!(key.chars().all(|c| c.is_ascii_digit()));
    }
}
