//! Prometheus metrics for the timeout sweep.
//!
//! Metrics are exposed in Prometheus text format at `http://<addr>/metrics`
//! once [`init_metrics`] has installed the exporter. Without an exporter the
//! recording functions are no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use tourney_worker::metrics;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tourney::SweepReport;

/// Initialize the Prometheus exporter on `addr`
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Record everything one sweep did
pub fn record_sweep(report: &SweepReport, duration: Duration) {
    if report.skipped {
        metrics::counter!("sweep_skipped_total").increment(1);
        return;
    }

    metrics::counter!("sweep_runs_total").increment(1);
    metrics::counter!("matches_warned_total").increment(report.warned as u64);
    metrics::counter!("matches_auto_confirmed_total").increment(report.auto_confirmed as u64);
    metrics::counter!("matches_expired_total").increment(report.expired as u64);
    metrics::counter!("sweep_stale_total").increment(report.stale as u64);
    metrics::counter!("sweep_failures_total").increment(report.failed as u64);
    metrics::counter!("prizes_disbursed_total").increment(report.disbursed as u64);
    metrics::histogram!("sweep_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Record a sweep that aborted before visiting any match
pub fn sweep_aborted() {
    metrics::counter!("sweep_aborted_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_functions_dont_panic() {
        // These should not panic even without an exporter
        record_sweep(
            &SweepReport {
                warned: 1,
                expired: 2,
                ..Default::default()
            },
            Duration::from_millis(15),
        );
        record_sweep(
            &SweepReport {
                skipped: true,
                ..Default::default()
            },
            Duration::ZERO,
        );
        sweep_aborted();
    }
}
