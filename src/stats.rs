use std::fmt;
use std::time::{Duration, Instant};

const NANOS_PER_MILLI: f64 = 1_000_000f64;

/// Running round-trip aggregates
///
/// Kept without storing individual samples: count, extremes, sum and sum of squares are enough for
/// min, avg, max and the sample standard deviation.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RttStats {
    count: u64,
    min: i64,
    max: i64,
    sum: f64,
    sum_sq: f64,
}

impl RttStats {
    pub fn record(&mut self, nanos: i64) {
        if self.count == 0 || nanos < self.min {
            self.min = nanos;
        }
        if self.count == 0 || nanos > self.max {
            self.max = nanos;
        }
        self.count += 1;
        self.sum += nanos as f64;
        self.sum_sq += (nanos as f64).powi(2);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Summarize in milliseconds, or `None` before the first sample
    pub fn summarize(&self) -> Option<RttSummary> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let avg = self.sum / n;

        // Bessel-corrected sample standard deviation, zero for a single sample
        let stdev = if self.count > 1 {
            ((self.sum_sq - n * avg * avg) / (n - 1f64)).max(0f64).sqrt()
        } else {
            0f64
        };

        Some(RttSummary {
            min: self.min as f64 / NANOS_PER_MILLI,
            avg: avg / NANOS_PER_MILLI,
            max: self.max as f64 / NANOS_PER_MILLI,
            stdev: stdev / NANOS_PER_MILLI,
        })
    }
}

/// Round-trip statistics in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub stdev: f64,
}

impl fmt::Display for RttSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rtt min/avg/max/stdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            self.min, self.avg, self.max, self.stdev
        )
    }
}

/// Counters of a running session
///
/// Owned by the session alone. `received` counts both replies and expirations, since either one
/// accounts for a probe when computing loss.
#[derive(Debug)]
pub struct SessionStats {
    sent: u64,
    received: u64,
    started: Instant,
    rtt: RttStats,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            sent: 0,
            received: 0,
            started: Instant::now(),
            rtt: RttStats::default(),
        }
    }

    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn record_reply(&mut self, round_trip_nanos: i64) {
        self.received += 1;
        self.rtt.record(round_trip_nanos);
    }

    pub fn record_expired(&mut self) {
        self.received += 1;
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Freeze the counters into a summary, measuring elapsed time up to now
    pub fn summarize(&self) -> Summary {
        Summary {
            transmitted: self.sent,
            received: self.received,
            elapsed: self.started.elapsed(),
            rtt: self.rtt.summarize(),
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summarising information about session outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub transmitted: u64,
    pub received: u64,
    pub elapsed: Duration,
    pub rtt: Option<RttSummary>,
}

impl Summary {
    /// Share of probes not accounted for, in percent
    ///
    /// Zero for a session that never sent anything. Duplicate replies never push it below zero.
    pub fn loss_percent(&self) -> f64 {
        if self.transmitted == 0 {
            return 0f64;
        }
        let lost = self.transmitted.saturating_sub(self.received);
        100f64 * lost as f64 / self.transmitted as f64
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transmitted={} received={} loss={:.1}% time={}ms",
            self.transmitted,
            self.received,
            self.loss_percent(),
            self.elapsed.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(transmitted: u64, received: u64) -> Summary {
        Summary {
            transmitted,
            received,
            elapsed: Duration::from_millis(1500),
            rtt: None,
        }
    }

    #[test]
    fn loss_percentage() {
        assert_eq!(summary(10, 7).loss_percent(), 30.0);
        assert_eq!(summary(5, 3).loss_percent(), 40.0);
        assert_eq!(summary(3, 3).loss_percent(), 0.0);
    }

    #[test]
    fn no_division_by_zero() {
        assert_eq!(summary(0, 0).loss_percent(), 0.0);
    }

    #[test]
    fn duplicates_do_not_go_negative() {
        assert_eq!(summary(2, 3).loss_percent(), 0.0);
    }

    #[test]
    fn summary_line() {
        assert_eq!(
            summary(5, 3).to_string(),
            "transmitted=5 received=3 loss=40.0% time=1500ms"
        );
    }

    #[test]
    fn rtt_aggregates() {
        let mut rtt = RttStats::default();
        assert_eq!(rtt.summarize(), None);

        for ms in &[2i64, 4, 4, 4, 5, 5, 7, 9] {
            rtt.record(ms * 1_000_000);
        }
        let s = rtt.summarize().unwrap();
        assert_eq!(rtt.count(), 8);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert!((s.avg - 5.0).abs() < 1e-9);

        // Sample standard deviation of the series above is sqrt(32 / 7)
        assert!((s.stdev - (32f64 / 7f64).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn single_sample_has_no_spread() {
        let mut rtt = RttStats::default();
        rtt.record(1_500_000);
        let s = rtt.summarize().unwrap();
        assert_eq!(s.min, 1.5);
        assert_eq!(s.max, 1.5);
        assert_eq!(s.stdev, 0.0);
    }

    #[test]
    fn expired_counts_as_received_without_rtt() {
        let mut stats = SessionStats::new();
        stats.record_sent();
        stats.record_sent();
        stats.record_expired();
        assert_eq!((stats.sent(), stats.received()), (2, 1));

        let s = stats.summarize();
        assert_eq!(s.transmitted, 2);
        assert_eq!(s.received, 1);
        assert_eq!(s.rtt, None);
        assert_eq!(s.loss_percent(), 50.0);
    }
}
