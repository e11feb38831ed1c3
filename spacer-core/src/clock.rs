use chrono::{DateTime, Duration, Local, Utc};
use parking_lot::Mutex;

/// Source of wall-clock time for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the local timezone in minutes west of UTC.
    fn local_minutes_west(&self) -> i32;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_minutes_west(&self) -> i32 {
        -Local::now().offset().local_minus_utc() / 60
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    minutes_west: i32,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, 0)
    }

    pub fn with_offset(now: DateTime<Utc>, minutes_west: i32) -> Self {
        Self {
            now: Mutex::new(now),
            minutes_west,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn local_minutes_west(&self) -> i32 {
        self.minutes_west
    }
}
