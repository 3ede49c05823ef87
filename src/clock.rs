//! Wall-clock capability used for acquisition stamps

use chrono::{Local, NaiveDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// `YYYYMMDD`
pub fn date_stamp(at: &NaiveDateTime) -> String {
    at.format("%Y%m%d").to_string()
}

/// `HHMMSS`
pub fn time_stamp(at: &NaiveDateTime) -> String {
    at.format("%H%M%S").to_string()
}

/// Local time of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
