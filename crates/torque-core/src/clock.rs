//! # Clock
//!
//! Time source abstraction plus civil-date helpers.
//!
//! torque-core never reads the system clock itself. Repositories receive a
//! [`Clock`] and pass the instant down into the pure functions, which keeps
//! queue-date, warranty and late-fee logic deterministic under test.
//!
//! ## Civil Dates
//! ```text
//!   instant (UTC)            outlet offset        civil date
//!   2024-03-01T20:30:00Z  +  +07:00 (420 min)  →  2024-03-02
//!   2024-03-01T20:30:00Z  +  -05:00 (-300 min) →  2024-03-01
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt::Debug;
use std::sync::Mutex;

/// Source of "now".
pub trait Clock: Send + Sync + Debug {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC civil date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant, for tests and the seed binary.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to a new instant.
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Civil date of `instant` at a fixed UTC offset in minutes.
pub fn civil_date(instant: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    (instant + Duration::minutes(utc_offset_minutes as i64)).date_naive()
}

/// Parses an ISO civil date (`YYYY-MM-DD`).
pub fn parse_civil_date(field: &str, value: &str) -> Result<NaiveDate, crate::ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        crate::ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "expected YYYY-MM-DD".to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_civil_date_offsets() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 20, 30, 0).unwrap();

        assert_eq!(civil_date(instant, 0), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(civil_date(instant, 420), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(civil_date(instant, -300), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let early = Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap();
        assert_eq!(civil_date(early, -300), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_fixed_clock() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::days(65));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 3, 20).unwrap());
    }

    #[test]
    fn test_parse_civil_date() {
        assert_eq!(
            parse_civil_date("start_date", "2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_civil_date("start_date", "15/01/2024").is_err());
    }
}
