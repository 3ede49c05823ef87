//! Capture counters for the sweep scheduler

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters shared by the pipeline and the scheduler
#[derive(Default)]
pub struct Metrics {
    pub captures_attempted: AtomicU64,
    pub captures_archived: AtomicU64,
    pub captures_failed: AtomicU64,
    pub weather_absent: AtomicU64,
    pub total_latency_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_capture(&self, success: bool, latency_ms: u64) {
        self.captures_attempted.fetch_add(1, Ordering::Relaxed);

        if success {
            self.captures_archived.fetch_add(1, Ordering::Relaxed);
        } else {
            self.captures_failed.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_weather_absent(&self) {
        self.weather_absent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempted = self.captures_attempted.load(Ordering::Relaxed);
        let failed = self.captures_failed.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            captures_attempted: attempted,
            captures_archived: self.captures_archived.load(Ordering::Relaxed),
            captures_failed: failed,
            weather_absent: self.weather_absent.load(Ordering::Relaxed),
            error_rate: if attempted > 0 { failed as f64 / attempted as f64 } else { 0.0 },
            avg_latency_ms: if attempted > 0 { total_latency / attempted } else { 0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub captures_attempted: u64,
    pub captures_archived: u64,
    pub captures_failed: u64,
    pub weather_absent: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
}

/// Timer for tracking capture latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
