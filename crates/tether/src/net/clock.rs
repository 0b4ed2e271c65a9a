use std::time::{Duration, Instant};

/// Monotonic millisecond stopwatch shared by the time-sync exchange.
#[derive(Debug, Clone, Copy)]
pub struct StopWatch {
    started: Instant,
}

impl Default for StopWatch {
    fn default() -> Self {
        Self::start()
    }
}

impl StopWatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn restart(&mut self) {
        self.started = Instant::now();
    }
}

/// One completed time-sync round trip, all values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    pub sent_ms: u64,
    pub remote_ms: u64,
    pub received_ms: u64,
}

impl ClockSample {
    pub fn round_trip_ms(&self) -> u64 {
        self.received_ms.saturating_sub(self.sent_ms)
    }

    /// Remote clock minus local clock, assuming a symmetric path.
    pub fn offset_ms(&self) -> i64 {
        let midpoint = self.sent_ms as i64 + self.round_trip_ms() as i64 / 2;
        self.remote_ms as i64 - midpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_monotonic() {
        let watch = StopWatch::start();
        let first = watch.elapsed_ms();
        std::thread::sleep(Duration::from_millis(5));
        assert!(watch.elapsed_ms() >= first + 5);
    }

    #[test]
    fn test_clock_sample() {
        let sample = ClockSample {
            sent_ms: 1000,
            remote_ms: 5050,
            received_ms: 1100,
        };
        assert_eq!(sample.round_trip_ms(), 100);
        assert_eq!(sample.offset_ms(), 4000);

        let skewed = ClockSample {
            sent_ms: 200,
            remote_ms: 0,
            received_ms: 100,
        };
        assert_eq!(skewed.round_trip_ms(), 0);
        assert_eq!(skewed.offset_ms(), -200);
    }
}
