//! Elapsed-time helper for duration stats.

use std::time::Instant;

/// One timer reading: seconds since the previous reading, and the running
/// total since the timer started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerStat {
    pub stat: f64,
    pub total: f64,
}

/// Iterator yielding successive elapsed-time readings.
///
/// ```
/// let mut t = statkeeper::timer();
/// // ... do some work ...
/// let reading = t.next().unwrap();
/// assert!(reading.stat >= 0.0);
/// ```
#[derive(Debug)]
pub struct Timer {
    last: Instant,
    total: f64,
}

impl Iterator for Timer {
    type Item = TimerStat;

    fn next(&mut self) -> Option<TimerStat> {
        let now = Instant::now();
        let stat = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.total += stat;
        Some(TimerStat {
            stat,
            total: self.total,
        })
    }
}

/// Start a timer whose readings measure the gap since the previous reading.
pub fn timer() -> Timer {
    Timer {
        last: Instant::now(),
        total: 0.0,
    }
}
