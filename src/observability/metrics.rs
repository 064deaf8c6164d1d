//! # Metrics Collection
//!
//! Prometheus metrics for refresh rounds, worker queries and fatal signals.
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs an exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{CredRefreshError, Result};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub const REFRESH_ROUNDS_TOTAL: &str = "credrefresh_refresh_rounds_total";
pub const REFRESH_DURATION_SECONDS: &str = "credrefresh_refresh_duration_seconds";
pub const QUERIES_TOTAL: &str = "credrefresh_queries_total";
pub const WORKERS_WAITING: &str = "credrefresh_workers_waiting";
pub const FATAL_SIGNALS_TOTAL: &str = "credrefresh_fatal_signals_total";

/// Metrics recorder that tracks refresher and worker activity
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record the end of a refresh round
    pub fn record_refresh_round(&self, outcome: &str, duration: f64) {
        let labels = [("outcome", outcome.to_string())];
        counter!(REFRESH_ROUNDS_TOTAL, &labels).increment(1);
        histogram!(REFRESH_DURATION_SECONDS, &labels).record(duration);
    }

    /// Record one worker cycle's query outcome (`ok`, `error` or `no_handle`)
    pub fn record_query(&self, outcome: &str) {
        let labels = [("outcome", outcome.to_string())];
        counter!(QUERIES_TOTAL, &labels).increment(1);
    }

    /// Workers currently parked at the refresh barrier
    pub fn set_workers_waiting(&self, waiting: usize) {
        gauge!(WORKERS_WAITING).set(waiting as f64);
    }

    pub fn record_fatal_signal(&self) {
        counter!(FATAL_SIGNALS_TOTAL).increment(1);
    }

    pub fn register_metrics(&self) {
        describe_counter!(
            REFRESH_ROUNDS_TOTAL,
            Unit::Count,
            "Completed refresh rounds grouped by outcome"
        );
        describe_histogram!(
            REFRESH_DURATION_SECONDS,
            Unit::Seconds,
            "Time from refresher wake-up to broadcast"
        );
        describe_counter!(QUERIES_TOTAL, Unit::Count, "Worker queries grouped by outcome");
        describe_gauge!(WORKERS_WAITING, Unit::Count, "Workers parked at the refresh barrier");
        describe_counter!(FATAL_SIGNALS_TOTAL, Unit::Count, "Fatal signals raised");
    }
}

/// Install the Prometheus exporter when a metrics port is configured.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(port) = config.metrics_port else {
        return Ok(());
    };

    let socket_addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            CredRefreshError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    MetricsRecorder::new().register_metrics();

    info!(
        metrics_addr = %socket_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
