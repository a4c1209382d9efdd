//! Trading-day clock
//!
//! "Today" means the calendar date in India Standard Time, regardless of the
//! host's time zone. Session tokens and cached candles are scoped to it.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Asia::Kolkata;
use std::time::SystemTime;

/// Current trading day (IST)
pub fn trading_day() -> NaiveDate {
    trading_day_of(Utc::now())
}

/// Trading day an instant falls on
pub fn trading_day_of(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Kolkata).date_naive()
}

/// Trading day of a filesystem timestamp
pub fn trading_day_of_system_time(time: SystemTime) -> NaiveDate {
    trading_day_of(DateTime::<Utc>::from(time))
}
