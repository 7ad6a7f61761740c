// Wall-clock minute cursor used to key bar lookups
use chrono::{Local, Timelike};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A minute-granularity time of day
///
/// `hour` is deliberately unbounded: stepping back past midnight yields a
/// negative hour and stepping forward past 23 keeps counting. Callers that
/// query data by hour should check [`ClockTime::is_trading_hour`] first.
///
/// Equality and ordering only look at hour and minute, `second` is carried
/// for display.
#[derive(Debug, Clone, Copy)]
pub struct ClockTime {
    pub hour: i32,
    pub minute: u32,
    pub second: u32,
}

impl ClockTime {
    pub fn new(hour: i32, minute: u32) -> Self {
        Self::with_second(hour, minute, 0)
    }

    /// Build a time, carrying excess seconds into minutes and minutes into hours
    pub fn with_second(hour: i32, minute: u32, second: u32) -> Self {
        let minute = minute.saturating_add(second / 60);
        Self {
            hour: hour.saturating_add((minute / 60) as i32),
            minute: minute % 60,
            second: second % 60,
        }
    }

    /// Read the local system wall clock
    pub fn now() -> Self {
        let now = Local::now();
        Self::with_second(now.hour() as i32, now.minute(), now.second())
    }

    /// Step forward one minute, carrying into the hour
    pub fn increment(&mut self) {
        if self.minute == 59 {
            self.hour += 1;
            self.minute = 0;
        } else {
            self.minute += 1;
        }
    }

    /// Step back one minute, borrowing from the hour
    pub fn decrement(&mut self) {
        if self.minute == 0 {
            self.hour -= 1;
            self.minute = 59;
        } else {
            self.minute -= 1;
        }
    }

    /// Whether the hour falls inside a single calendar day (0..=23)
    pub fn is_trading_hour(&self) -> bool {
        (0..=23).contains(&self.hour)
    }
}

impl PartialEq for ClockTime {
    fn eq(&self, other: &Self) -> bool {
        self.hour == other.hour && self.minute == other.minute
    }
}

impl Eq for ClockTime {}

impl PartialOrd for ClockTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClockTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.hour, self.minute).cmp(&(other.hour, other.minute))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Source of "now" for the bar window
pub trait Clock: Send + Sync {
    fn now(&self) -> ClockTime;
}

/// Reads the local wall clock on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ClockTime {
        ClockTime::now()
    }
}

/// Hand-driven clock for replays and tests
///
/// Clones share the same underlying time, so one handle can be given to a
/// feed while another advances it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<RwLock<ClockTime>>,
}

impl ManualClock {
    pub fn new(start: ClockTime) -> Self {
        Self {
            time: Arc::new(RwLock::new(start)),
        }
    }

    pub fn set(&self, time: ClockTime) {
        // A poisoned lock still holds a plain Copy value, recover it
        let mut guard = self.time.write().unwrap_or_else(|e| e.into_inner());
        *guard = time;
    }

    /// Move the clock forward by one minute
    pub fn advance(&self) {
        let mut guard = self.time.write().unwrap_or_else(|e| e.into_inner());
        guard.increment();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ClockTime {
        *self.time.read().unwrap_or_else(|e| e.into_inner())
    }
}
