//! Trading-date computation.
//!
//! The trading date is the US/Eastern calendar date, rolled back to Friday on
//! weekends. Exchange holidays are not modelled: a holiday keeps its own
//! trading date and simply returns the previous session's bars.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use std::sync::{Arc, RwLock};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Trading date at the current instant.
    fn trading_date(&self) -> NaiveDate {
        trading_date_at(self.now())
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Clock set to 20:00 UTC on `date` (afternoon in New York).
    pub fn on_date(date: NaiveDate) -> Self {
        let afternoon = date.and_hms_opt(20, 0, 0).unwrap_or_default();
        Self::new(Utc.from_utc_datetime(&afternoon))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|g| *g).unwrap_or_else(|_| Utc::now())
    }
}

/// US daylight saving: second Sunday of March 07:00 UTC until the first
/// Sunday of November 06:00 UTC.
fn is_us_dst(now: DateTime<Utc>) -> bool {
    let year = now.year();
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .and_then(|d| d.and_hms_opt(7, 0, 0));
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .and_then(|d| d.and_hms_opt(6, 0, 0));

    match (start, end) {
        (Some(start), Some(end)) => {
            let naive = now.naive_utc();
            naive >= start && naive < end
        }
        _ => false,
    }
}

/// Trading date for a UTC instant.
pub fn trading_date_at(now: DateTime<Utc>) -> NaiveDate {
    let offset_hours = if is_us_dst(now) { 4 } else { 5 };
    let eastern = (now - Duration::hours(offset_hours)).date_naive();

    match eastern.weekday() {
        Weekday::Sat => eastern - Duration::days(1),
        Weekday::Sun => eastern - Duration::days(2),
        _ => eastern,
    }
}
