// src/utils/time.rs
//! Clock abstraction for wall-clock refresh cadences

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time provider trait for dependency injection and testing
pub trait TimeProvider: Send + Sync {
    /// Nanoseconds since an arbitrary, fixed origin. Never decreases.
    fn now_nanos(&self) -> u64;

    fn now_micros(&self) -> u64 {
        self.now_nanos() / 1000
    }

    /// Time elapsed since an earlier `now_nanos` reading
    fn elapsed_since(&self, earlier_nanos: u64) -> Duration {
        Duration::from_nanos(self.now_nanos().saturating_sub(earlier_nanos))
    }
}

/// Monotonic clock anchored at construction
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeProvider {
    origin: Instant,
}

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Mock time provider for deterministic testing
#[derive(Debug, Default)]
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_nanos: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_nanos),
        }
    }

    pub fn advance_by(&self, nanos: u64) {
        self.current_time.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn advance(&self, duration: Duration) {
        self.advance_by(duration.as_nanos() as u64);
    }

    pub fn set_time(&self, nanos: u64) {
        self.current_time.store(nanos, Ordering::Relaxed);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for std::sync::Arc<T> {
    fn now_nanos(&self) -> u64 {
        (**self).now_nanos()
    }
}
