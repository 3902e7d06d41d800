//! Prometheus metrics for ledger observability.
//!
//! Covers the write path (applies, shortages, lock timeouts), the checkout
//! validator (reservations, releases), and retry behavior.
//!
//! # Example
//!
//! ```rust,no_run
//! use stock_ledger::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Initialize metrics and start the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics exporter cannot be installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this will
    /// log a warning and continue rather than fail.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Write path
    describe_counter!(
        "ledger_commands_applied_total",
        "Total number of delta commands committed"
    );
    describe_counter!(
        "ledger_shortages_total",
        "Total number of commands rejected for insufficient stock"
    );
    describe_counter!(
        "ledger_lock_timeouts_total",
        "Total number of batches aborted waiting for a row lock"
    );
    describe_histogram!(
        "ledger_apply_duration_seconds",
        "Time taken to apply a delta batch"
    );

    // Checkout validator
    describe_counter!(
        "reservations_succeeded_total",
        "Total number of order reservations committed"
    );
    describe_counter!(
        "reservations_insufficient_total",
        "Total number of order reservations rejected for insufficient stock"
    );
    describe_counter!(
        "releases_applied_total",
        "Total number of order releases (cancellation/refund restores)"
    );

    // Retry
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
}

/// Write-path metrics recorder.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record a committed batch.
    pub fn record_apply(commands: usize, duration: Duration) {
        counter!("ledger_commands_applied_total").increment(commands as u64);
        histogram!("ledger_apply_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a batch rejected for insufficient stock.
    pub fn record_shortages(count: usize) {
        counter!("ledger_shortages_total").increment(count as u64);
    }

    /// Record a batch aborted on lock timeout.
    pub fn record_lock_timeout() {
        counter!("ledger_lock_timeouts_total").increment(1);
    }
}

/// Checkout validator metrics recorder.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// Record a committed reservation.
    pub fn record_success() {
        counter!("reservations_succeeded_total").increment(1);
    }

    /// Record a reservation rejected for insufficient stock.
    pub fn record_insufficient() {
        counter!("reservations_insufficient_total").increment(1);
    }

    /// Record a committed release.
    pub fn record_release() {
        counter!("releases_applied_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
