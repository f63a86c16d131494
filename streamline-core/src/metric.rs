//! Network metrics emitted once per completed transport task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and size snapshot for one completed network task.
///
/// DNS and TLS durations come from the last transaction of the task, so a
/// redirected request reports the phases of its final hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetric {
    /// Path of the original request URL, e.g. `/posts`.
    pub url_path: String,
    /// Final status code, if a response arrived.
    pub status_code: Option<u16>,
    /// Wall time of the whole task, redirects included.
    pub total_duration: Duration,
    /// DNS lookup time of the last transaction.
    pub dns_duration: Option<Duration>,
    /// TLS handshake time of the last transaction.
    pub tls_duration: Option<Duration>,
    /// Request body bytes sent by the last transaction.
    pub bytes_sent: u64,
    /// Response body bytes received by the last transaction.
    pub bytes_received: u64,
    /// When the task finished.
    pub finished_at: DateTime<Utc>,
}

impl NetworkMetric {
    /// Returns true if the task ended with a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status_code.is_some_and(crate::status::is_success)
    }

    /// Fast Wi-Fi, nearby server.
    pub fn mock_good() -> Self {
        Self::mock(200, 250, 15, 80, 2_000, 30_000)
    }

    /// Typical 4G connection.
    pub fn mock_medium() -> Self {
        Self::mock(200, 750, 45, 180, 3_000, 90_000)
    }

    /// Congested network and a failing server.
    pub fn mock_bad() -> Self {
        Self::mock(500, 2_500, 200, 400, 4_000, 250_000)
    }

    fn mock(status: u16, total_ms: u64, dns_ms: u64, tls_ms: u64, sent: u64, received: u64) -> Self {
        Self {
            url_path: "/posts".to_string(),
            status_code: Some(status),
            total_duration: Duration::from_millis(total_ms),
            dns_duration: Some(Duration::from_millis(dns_ms)),
            tls_duration: Some(Duration::from_millis(tls_ms)),
            bytes_sent: sent,
            bytes_received: received,
            finished_at: Utc::now(),
        }
    }
}
