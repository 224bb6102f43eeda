//! Reference instants for synthetic data.

use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveTime, Utc};

/// The "now" and "today" every synthetic aggregate of a run is derived from.
///
/// Captured once per run and passed explicitly to the factories, so two
/// backends fed the same clock produce identical data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    now: DateTime<Utc>,
    today: NaiveDate,
}

impl Clock {
    /// Capture the current system time.
    pub fn system() -> Self {
        Self::fixed(Utc::now())
    }

    /// Build a clock frozen at the given instant.
    ///
    /// The instant is truncated to microseconds, the finest precision the
    /// relational backends store.
    pub fn fixed(now: DateTime<Utc>) -> Self {
        let now = now
            .duration_trunc(Duration::microseconds(1))
            .unwrap_or(now);
        Self {
            now,
            today: now.date_naive(),
        }
    }

    /// The frozen instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The UTC calendar date of [`Clock::now`].
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// `today + days`.
    pub fn day(&self, days: i64) -> NaiveDate {
        self.today + Duration::days(days)
    }

    /// Midnight UTC of `today + days`.
    pub fn midnight(&self, days: i64) -> DateTime<Utc> {
        self.day(days).and_time(NaiveTime::MIN).and_utc()
    }

    /// `now + minutes`.
    pub fn minutes(&self, minutes: i64) -> DateTime<Utc> {
        self.now + Duration::minutes(minutes)
    }

    /// `now + millis`.
    pub fn millis(&self, millis: i64) -> DateTime<Utc> {
        self.now + Duration::milliseconds(millis)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}
