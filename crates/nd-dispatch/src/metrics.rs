//! Dispatch metrics
//!
//! Per-subject outcome counters and latency histograms. Every observation is
//! kept in memory for inspection and forwarded to the process-wide `metrics`
//! recorder, which the server exposes through the Prometheus exporter.

use dashmap::DashMap;
use hdrhistogram::Histogram;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::ErrorKind;

pub const HANDLED_TOTAL: &str = "nats_server_handled_total";
pub const HANDLING_SECONDS: &str = "nats_server_handling_seconds";

/// Status label for successful dispatches
pub const STATUS_OK: &str = "OK";

/// Highest latency tracked by the in-memory histograms (one hour, in micros)
const MAX_TRACKED_MICROS: u64 = 3_600_000_000;

/// Running latency measurement for one message
#[derive(Debug)]
pub struct TimerHandle {
    subject: String,
    started: Instant,
}

impl TimerHandle {
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OutcomeKey {
    subject: String,
    success: bool,
    status: &'static str,
}

/// Latency percentiles for one subject
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySnapshot {
    pub count: u64,
    pub p50: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Metrics collector shared by all concurrent dispatches.
///
/// Counters are atomics keyed by label set; histograms sit behind a short
/// lived mutex per subject. Nothing here performs I/O.
pub struct DispatchMetrics {
    outcomes: DashMap<OutcomeKey, AtomicU64>,
    latencies: DashMap<String, Mutex<Histogram<u64>>>,
    total_success: AtomicU64,
    total_failure: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            outcomes: DashMap::new(),
            latencies: DashMap::new(),
            total_success: AtomicU64::new(0),
            total_failure: AtomicU64::new(0),
        }
    }

    /// Register descriptions with the installed recorder
    pub fn describe() {
        describe_counter!(
            HANDLED_TOTAL,
            "Total number of NATS messages handled, labelled by subject, success and status"
        );
        describe_histogram!(
            HANDLING_SECONDS,
            Unit::Seconds,
            "Time spent handling NATS messages, labelled by subject"
        );
    }

    pub fn start_timer(&self, subject: &str) -> TimerHandle {
        TimerHandle {
            subject: subject.to_string(),
            started: Instant::now(),
        }
    }

    /// Stop the timer and record the elapsed time
    pub fn observe(&self, timer: TimerHandle) -> Duration {
        let elapsed = timer.started.elapsed();

        histogram!(HANDLING_SECONDS, "subject" => timer.subject.clone()).record(elapsed.as_secs_f64());

        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let recorded = match self.latencies.get(&timer.subject) {
            Some(entry) => {
                entry.lock().saturating_record(micros);
                true
            }
            None => false,
        };
        if !recorded {
            match Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3) {
                Ok(hist) => {
                    self.latencies
                        .entry(timer.subject)
                        .or_insert_with(|| Mutex::new(hist))
                        .lock()
                        .saturating_record(micros);
                }
                Err(e) => warn!(error = %e, "Failed to create latency histogram"),
            }
        }

        elapsed
    }

    /// Count one handled message. `None` means success.
    pub fn record_outcome(&self, subject: &str, error: Option<ErrorKind>) {
        let (success, status) = match error {
            None => (true, STATUS_OK),
            Some(kind) => (false, kind.wire_name()),
        };

        counter!(
            HANDLED_TOTAL,
            "subject" => subject.to_string(),
            "success" => success.to_string(),
            "status" => status
        )
        .increment(1);

        let key = OutcomeKey {
            subject: subject.to_string(),
            success,
            status,
        };
        self.outcomes
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);

        if success {
            self.total_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_success(&self, subject: &str) {
        self.record_outcome(subject, None);
    }

    pub fn record_failure(&self, subject: &str, kind: ErrorKind) {
        self.record_outcome(subject, Some(kind));
    }

    /// Messages recorded for `subject` with the given status label
    pub fn outcome_count(&self, subject: &str, status: &str) -> u64 {
        self.outcomes
            .iter()
            .filter(|e| e.key().subject == subject && e.key().status == status)
            .map(|e| e.value().load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_success(&self) -> u64 {
        self.total_success.load(Ordering::Relaxed)
    }

    pub fn total_failure(&self) -> u64 {
        self.total_failure.load(Ordering::Relaxed)
    }

    pub fn latency(&self, subject: &str) -> Option<LatencySnapshot> {
        let entry = self.latencies.get(subject)?;
        let hist = entry.lock();
        if hist.len() == 0 {
            return None;
        }
        Some(LatencySnapshot {
            count: hist.len(),
            p50: Duration::from_micros(hist.value_at_quantile(0.50)),
            p99: Duration::from_micros(hist.value_at_quantile(0.99)),
            max: Duration::from_micros(hist.max()),
        })
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_outcomes_are_labelled_by_status() {
        let metrics = DispatchMetrics::new();
        metrics.record_success("find.svc.cats");
        metrics.record_success("find.svc.cats");
        metrics.record_failure("find.svc.cats", ErrorKind::NotFound);
        metrics.record_outcome("create.svc.cats", Some(ErrorKind::BadRequest));

        assert_eq!(metrics.outcome_count("find.svc.cats", STATUS_OK), 2);
        assert_eq!(metrics.outcome_count("find.svc.cats", "NotFoundError"), 1);
        assert_eq!(metrics.outcome_count("find.svc.cats", "BadRequestError"), 0);
        assert_eq!(metrics.outcome_count("create.svc.cats", "BadRequestError"), 1);
        assert_eq!(metrics.total_success(), 2);
        assert_eq!(metrics.total_failure(), 2);
    }

    #[test]
    fn test_observe_records_latency() {
        let metrics = DispatchMetrics::new();
        assert!(metrics.latency("a").is_none());

        let timer = metrics.start_timer("a");
        assert_eq!(timer.subject(), "a");
        std::thread::sleep(Duration::from_millis(2));
        let elapsed = metrics.observe(timer);
        assert!(elapsed >= Duration::from_millis(2));

        metrics.observe(metrics.start_timer("a"));

        let snapshot = metrics.latency("a").unwrap();
        assert_eq!(snapshot.count, 2);
        assert!(snapshot.max >= Duration::from_millis(1));
        assert!(metrics.latency("b").is_none());
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(DispatchMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let timer = metrics.start_timer("busy");
                        metrics.observe(timer);
                        metrics.record_success("busy");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.outcome_count("busy", STATUS_OK), 800);
        assert_eq!(metrics.latency("busy").unwrap().count, 800);
    }
}
