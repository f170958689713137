use std::io::{self, Write};
use std::time::Instant;

/// Best-effort progress reporting; implementations must never fail the run.
pub trait ProgressSink {
    fn info(&self, msg: &str);

    /// `fraction` is in `[0, 1]`.
    fn report(&self, fraction: f64, status: &str);
}

/// `current / total`, clamped to `[0, 1]`; a run with no work is complete.
#[must_use]
pub fn progress_fraction(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (current.min(total) as f64) / (total as f64)
}

pub struct ConsoleProgress {
    enabled: bool,
    t0: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            t0: Instant::now(),
        }
    }

    fn stamp(&self) -> String {
        fmt_elapsed(self.t0.elapsed().as_secs_f64())
    }
}

impl ProgressSink for ConsoleProgress {
    fn info(&self, msg: &str) {
        if !self.enabled {
            return;
        }
        let ts = self.stamp();
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {msg}");
    }

    fn report(&self, fraction: f64, status: &str) {
        if !self.enabled {
            return;
        }
        let pct = fraction.clamp(0.0, 1.0) * 100.0;
        let ts = self.stamp();
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {status} ({pct:5.1}%)");
    }
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn info(&self, _msg: &str) {}

    fn report(&self, _fraction: f64, _status: &str) {}
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_empty_and_overflowing_totals() {
        assert_eq!(progress_fraction(0, 0), 1.0);
        assert_eq!(progress_fraction(1, 4), 0.25);
        assert_eq!(progress_fraction(9, 4), 1.0);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(fmt_elapsed(65.0), "01:05");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
    }
}
