//! Monotonic wall-clock timer with accumulated elapsed time.
//!
//! Mirrors the reference `Timer` component: a timestamp source
//! (`get_timestamp`), a start/elapsed stopwatch (`start`/`elapsed`/`clear`),
//! and a pause/resume accumulator used to measure time spent inside a
//! specific section of code (the per-stream memcpy timer).

use std::time::Instant;

/// Returns the current wall-clock time as seconds since an arbitrary epoch.
///
/// Only differences between two calls are meaningful; the absolute value
/// has no defined relationship to UTC.
pub fn get_timestamp() -> f64 {
    // `Instant` has no usable absolute value, so anchor against a
    // process-lifetime origin established on first use.
    static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let origin = *ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_secs_f64()
}

/// A free-running stopwatch that can be started, queried, and cleared.
#[derive(Debug)]
pub struct Timer {
    started_at: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self { started_at: None }
    }

    /// (Re-)starts the timer from now.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Seconds elapsed since the last `start`. Zero if never started.
    pub fn elapsed(&self) -> f64 {
        match self.started_at {
            Some(t) => t.elapsed().as_secs_f64(),
            None => 0.0,
        }
    }

    /// Stops tracking; a subsequent `elapsed()` call returns zero until
    /// `start` is called again.
    pub fn clear(&mut self) {
        self.started_at = None;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates time spent between matched `resume`/`pause` calls, for
/// measuring the fraction of wall time a hot loop spends doing one thing
/// (here: the visibility-payload memcpy) versus everything else.
#[derive(Debug, Default)]
pub struct AccumulatingTimer {
    total: f64,
    resumed_at: Option<Instant>,
}

impl AccumulatingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(t) = self.resumed_at.take() {
            self.total += t.elapsed().as_secs_f64();
        }
    }

    /// Total accumulated seconds across all resume/pause spans since the
    /// last `clear`.
    pub fn elapsed(&self) -> f64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.total = 0.0;
        self.resumed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn stopwatch_accumulates_and_clears() {
        let mut t = Timer::new();
        assert_eq!(t.elapsed(), 0.0);
        t.start();
        sleep(Duration::from_millis(5));
        assert!(t.elapsed() > 0.0);
        t.clear();
        assert_eq!(t.elapsed(), 0.0);
    }

    #[test]
    fn accumulating_timer_sums_spans() {
        let mut t = AccumulatingTimer::new();
        t.resume();
        sleep(Duration::from_millis(5));
        t.pause();
        let after_first = t.elapsed();
        assert!(after_first > 0.0);
        t.resume();
        sleep(Duration::from_millis(5));
        t.pause();
        assert!(t.elapsed() > after_first);
        t.clear();
        assert_eq!(t.elapsed(), 0.0);
    }
}
