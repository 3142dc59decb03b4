//! Injected source of "today".
//!
//! The engine never reads the system time directly; it asks a [`Clock`].
//! Tests use [`FixedClock`] to pin and advance the calendar deterministically.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Utc};

/// Supplies the current calendar day and wall-clock instant.
pub trait Clock: Send + Sync {
    /// The user's current calendar day.
    fn today(&self) -> NaiveDate;

    /// Timestamp used for audit entries and record updates.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Move the clock to `date`.
    pub fn set(&self, date: NaiveDate) {
        *self.today.lock().unwrap_or_else(|e| e.into_inner()) = date;
    }

    /// Move the clock forward by `days`.
    pub fn advance_days(&self, days: i64) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        *today += Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.today().and_time(NaiveTime::default()).and_utc()
    }
}
