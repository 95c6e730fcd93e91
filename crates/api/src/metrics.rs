use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_upload_time_us: AtomicU64,
    total_ask_time_us: AtomicU64,
    total_search_time_us: AtomicU64,

    // Counts
    documents_uploaded: AtomicUsize,
    questions_answered: AtomicUsize,
    generation_failures: AtomicUsize,
    searches: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_upload(&self, duration: Duration) {
        self.total_upload_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.documents_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ask(&self, duration: Duration, generation_failed: bool) {
        self.total_ask_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
        if generation_failed {
            self.generation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_search(&self, duration: Duration) {
        self.total_search_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            documents_uploaded: self.documents_uploaded.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            avg_upload_time_ms: avg_time_ms(&self.total_upload_time_us, &self.documents_uploaded),
            avg_ask_time_ms: avg_time_ms(&self.total_ask_time_us, &self.questions_answered),
            avg_search_time_ms: avg_time_ms(&self.total_search_time_us, &self.searches),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub documents_uploaded: usize,
    pub questions_answered: usize,
    pub generation_failures: usize,
    pub searches: usize,
    pub avg_upload_time_ms: f64,
    pub avg_ask_time_ms: f64,
    pub avg_search_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_averages() {
        let metrics = Metrics::new();
        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_ask(Duration::from_millis(10), false);
        metrics.record_ask(Duration::from_millis(30), true);

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.generation_failures, 1);
        assert!((snapshot.avg_ask_time_ms - 20.0).abs() < 1e-9);
        assert_eq!(snapshot.avg_search_time_ms, 0.0);
    }
}
