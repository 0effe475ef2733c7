//! Request statistics for the prediction service.

use crate::types::prediction::Prediction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by all request handlers
pub struct ServiceMetrics {
    /// Requests that produced predictions
    pub requests_succeeded: AtomicU64,
    /// Requests that ended in an error response
    pub requests_failed: AtomicU64,
    /// Rows predicted across all successful requests
    pub rows_predicted: AtomicU64,
    /// Predicted label counts, indexed by label
    label_counts: [AtomicU64; 2],
    /// Failures by error kind
    errors_by_kind: RwLock<HashMap<String, u64>>,
    /// Request processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            rows_predicted: AtomicU64::new(0),
            label_counts: [AtomicU64::new(0), AtomicU64::new(0)],
            errors_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a request that returned predictions
    pub fn record_success(&self, processing_time: Duration, predictions: &[Prediction]) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.rows_predicted
            .fetch_add(predictions.len() as u64, Ordering::Relaxed);
        self.record_time(processing_time);

        for p in predictions {
            self.label_counts[usize::from(p.label.min(1))].fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut buckets) = self.probability_buckets.write() {
            for p in predictions {
                let bucket = (p.probability * 10.0).clamp(0.0, 9.0) as usize;
                buckets[bucket] += 1;
            }
        }
    }

    /// Record a request that failed with the given error kind
    pub fn record_error(&self, kind: &str, processing_time: Duration) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_time(processing_time);

        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    fn record_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.requests_succeeded.load(Ordering::Relaxed)
            + self.requests_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_label_counts(&self) -> [u64; 2] {
        [
            self.label_counts[0].load(Ordering::Relaxed),
            self.label_counts[1].load(Ordering::Relaxed),
        ]
    }

    pub fn get_errors_by_kind(&self) -> HashMap<String, u64> {
        self.errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    /// Point-in-time view served at `/metrics`
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            rows_predicted: self.rows_predicted.load(Ordering::Relaxed),
            throughput_rps: self.get_throughput(),
            label_counts: self.get_label_counts(),
            errors_by_kind: self.get_errors_by_kind(),
            processing: self.get_processing_stats(),
            probability_distribution: self.get_probability_distribution(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let s = self.snapshot();
        let total = s.requests_succeeded + s.requests_failed;
        let error_rate = if total > 0 {
            (s.requests_failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        info!(
            requests = total,
            failed = s.requests_failed,
            error_rate = %format!("{:.1}%", error_rate),
            throughput = %format!("{:.1} req/s", s.throughput_rps),
            rows = s.rows_predicted,
            label_0 = s.label_counts[0],
            label_1 = s.label_counts[1],
            "Prediction service summary"
        );
        info!(
            mean_us = s.processing.mean_us,
            p50_us = s.processing.p50_us,
            p95_us = s.processing.p95_us,
            p99_us = s.processing.p99_us,
            max_us = s.processing.max_us,
            "Request latency"
        );
        for (kind, count) in &s.errors_by_kind {
            info!(kind = %kind, count = count, "Errors by kind");
        }

        let rows: u64 = s.probability_distribution.iter().sum();
        for (i, &count) in s.probability_distribution.iter().enumerate() {
            let pct = if rows > 0 { (count as f64 / rows as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
            info!(
                "  p {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable metrics view
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub rows_predicted: u64,
    pub throughput_rps: f64,
    pub label_counts: [u64; 2],
    pub errors_by_kind: HashMap<String, u64>,
    pub processing: ProcessingStats,
    pub probability_distribution: [u64; 10],
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = ServiceMetrics::new();

        metrics.record_success(
            Duration::from_micros(100),
            &[
                Prediction::from_probability(0.2),
                Prediction::from_probability(0.9),
                Prediction::from_probability(1.0),
            ],
        );
        metrics.record_error("shape", Duration::from_micros(20));
        metrics.record_error("shape", Duration::from_micros(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_succeeded, 1);
        assert_eq!(snapshot.requests_failed, 2);
        assert_eq!(snapshot.rows_predicted, 3);
        assert_eq!(snapshot.label_counts, [1, 2]);
        assert_eq!(snapshot.errors_by_kind.get("shape"), Some(&2));
        assert_eq!(snapshot.probability_distribution[2], 1);
        assert_eq!(snapshot.probability_distribution[9], 2);
        assert_eq!(snapshot.processing.count, 3);
        assert_eq!(snapshot.processing.max_us, 100);
    }

    #[test]
    fn test_empty_processing_stats() {
        let stats = ServiceMetrics::new().get_processing_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99_us, 0);
    }
}
