//! Liveness probe for the companion server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

/// How long a ping may take before the peer counts as unreachable.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A single boolean health check against the configured remote base address.
///
/// Connectivity failure is an ordinary, expected outcome; `check` never
/// returns an error.
pub struct ConnectivityProbe {
    client: reqwest::Client,
    connected: AtomicBool,
}

impl ConnectivityProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            connected: AtomicBool::new(false),
        }
    }

    /// GET `{base_url}/ping`. `true` only on HTTP 200; any timeout,
    /// transport error, or other status is `false`.
    pub async fn check(&self, base_url: &str) -> bool {
        let url = format!("{base_url}/ping");
        let reachable = match self.client.get(&url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "sync server ping failed");
                false
            }
        };
        self.connected.store(reachable, Ordering::Relaxed);
        reachable
    }

    /// Advisory flag for status displays. Remote operations re-probe rather
    /// than trusting this value.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Default for ConnectivityProbe {
    fn default() -> Self {
        Self::new()
    }
}
