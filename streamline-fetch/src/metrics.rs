//! Per-task timing data and the collector that turns it into
//! [`NetworkMetric`] events.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};
use url::Url;

use streamline_core::NetworkMetric;

// ============================================================================
// Transaction / Task Metrics
// ============================================================================

/// Timing of one request/response exchange. A redirected task has one
/// transaction per hop.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// URL of this hop.
    pub url: Url,
    /// Status of this hop, if a response arrived.
    pub status: Option<u16>,
    /// DNS lookup time, when the client exposes it.
    pub dns: Option<Duration>,
    /// TLS handshake time, when the client exposes it.
    pub tls: Option<Duration>,
    /// Body bytes sent.
    pub request_bytes: u64,
    /// Body bytes received.
    pub response_bytes: u64,
    /// When the hop started.
    pub started: Instant,
    /// When the hop finished.
    pub finished: Instant,
}

impl TransactionMetrics {
    /// Starts timing a hop to `url`.
    pub fn start(url: Url, request_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            url,
            status: None,
            dns: None,
            tls: None,
            request_bytes,
            response_bytes: 0,
            started: now,
            finished: now,
        }
    }

    /// Marks the hop finished with `status` and `response_bytes`.
    pub fn finish(&mut self, status: u16, response_bytes: u64) {
        self.status = Some(status);
        self.response_bytes = response_bytes;
        self.finished = Instant::now();
    }
}

/// Timing of a whole task, redirects included.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMetrics {
    /// When the task started.
    pub started: Instant,
    /// When the task finished.
    pub finished: Instant,
    /// One entry per hop, in order.
    pub transactions: Vec<TransactionMetrics>,
}

impl TaskMetrics {
    /// Starts timing a task.
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            finished: now,
            transactions: Vec::new(),
        }
    }

    /// Marks the task finished.
    pub fn finish(&mut self) {
        self.finished = Instant::now();
    }

    /// Closes a task that ended without a response. The single recorded
    /// hop spans the whole task and carries no status.
    pub fn fail(&mut self, url: Url, request_bytes: u64) {
        self.finish();
        let mut hop = TransactionMetrics::start(url, request_bytes);
        hop.started = self.started;
        hop.finished = self.finished;
        self.transactions.push(hop);
    }

    /// Wall time of the task.
    pub fn total_duration(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }

    /// Last hop of the task.
    pub fn last_transaction(&self) -> Option<&TransactionMetrics> {
        self.transactions.last()
    }

    /// Builds the metric for a task started at `url`.
    ///
    /// Phase durations and byte counts come from the last transaction.
    pub fn to_network_metric(&self, url: &Url, status: Option<u16>) -> NetworkMetric {
        let last = self.last_transaction();
        NetworkMetric {
            url_path: url.path().to_string(),
            status_code: status,
            total_duration: self.total_duration(),
            dns_duration: last.and_then(|t| t.dns),
            tls_duration: last.and_then(|t| t.tls),
            bytes_sent: last.map_or(0, |t| t.request_bytes),
            bytes_received: last.map_or(0, |t| t.response_bytes),
            finished_at: Utc::now(),
        }
    }
}

// ============================================================================
// Metrics Collector
// ============================================================================

/// Callback receiving one metric per completed task.
pub type MetricObserver = Arc<dyn Fn(NetworkMetric) + Send + Sync>;

/// Forwards completed task metrics to a registered observer.
#[derive(Default)]
pub struct MetricsCollector {
    observer: RwLock<Option<MetricObserver>>,
}

impl MetricsCollector {
    /// Creates a collector with no observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the observer. `None` stops delivery.
    pub fn set_observer(&self, observer: Option<MetricObserver>) {
        match self.observer.write() {
            Ok(mut guard) => *guard = observer,
            Err(poisoned) => *poisoned.into_inner() = observer,
        }
    }

    /// Returns true if an observer is registered.
    pub fn has_observer(&self) -> bool {
        self.observer.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Builds the metric for a completed task and hands it to the observer.
    pub fn collect(&self, url: &Url, status: Option<u16>, task: &TaskMetrics) -> NetworkMetric {
        let metric = task.to_network_metric(url, status);
        debug!(
            path = %metric.url_path,
            status = ?metric.status_code,
            total_ms = metric.total_duration.as_millis(),
            hops = task.transactions.len(),
            "Task metrics collected"
        );

        let observer = match self.observer.read() {
            Ok(guard) => guard.clone(),
            Err(_) => {
                warn!("Metric observer lock poisoned, dropping metric");
                None
            }
        };
        if let Some(observer) = observer {
            observer(metric.clone());
        }
        metric
    }
}

impl fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("has_observer", &self.has_observer())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn hop(url: &str, dns_ms: u64, tls_ms: u64, status: u16) -> TransactionMetrics {
        let mut t = TransactionMetrics::start(Url::parse(url).unwrap(), 10);
        t.dns = Some(Duration::from_millis(dns_ms));
        t.tls = Some(Duration::from_millis(tls_ms));
        t.finish(status, 100);
        t
    }

    #[test]
    fn test_redirect_uses_last_transaction() {
        let mut task = TaskMetrics::start();
        task.transactions
            .push(hop("https://a.example.com/old", 40, 90, 302));
        task.transactions
            .push(hop("https://b.example.com/new", 5, 12, 200));
        task.finish();

        let url = Url::parse("https://a.example.com/old").unwrap();
        let metric = task.to_network_metric(&url, Some(200));
        assert_eq!(metric.url_path, "/old");
        assert_eq!(metric.dns_duration, Some(Duration::from_millis(5)));
        assert_eq!(metric.tls_duration, Some(Duration::from_millis(12)));
        assert_eq!(metric.status_code, Some(200));
    }

    #[test]
    fn test_collect_notifies_observer() {
        let seen: Arc<Mutex<Vec<NetworkMetric>>> = Arc::default();
        let sink = seen.clone();
        let collector = MetricsCollector::new();
        collector.set_observer(Some(Arc::new(move |m: NetworkMetric| sink.lock().unwrap().push(m))));
        assert!(collector.has_observer());

        let mut task = TaskMetrics::start();
        task.transactions.push(hop("https://a.example.com/x", 1, 2, 200));
        task.finish();
        collector.collect(&Url::parse("https://a.example.com/x").unwrap(), Some(200), &task);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].bytes_received, 100);
    }

    #[test]
    fn test_collect_without_observer() {
        let collector = MetricsCollector::new();
        let task = TaskMetrics::start();
        let metric =
            collector.collect(&Url::parse("https://a.example.com/").unwrap(), None, &task);
        assert_eq!(metric.bytes_sent, 0);
        assert!(metric.dns_duration.is_none());
    }
}
