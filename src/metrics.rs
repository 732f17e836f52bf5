//! Prometheus metrics for monitoring
//!
//! Exposes counters for pool throughput and drop causes plus batch
//! timing histograms, covering what the batch logs also report.

use crate::error::PoolResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

lazy_static! {
    pub static ref TX_ENQUEUED: Counter = register_counter!(
        "txpool_requests_enqueued_total",
        "Total write requests enqueued"
    )
    .unwrap();

    pub static ref TX_SENT: Counter = register_counter!(
        "txpool_transactions_sent_total",
        "Total transactions submitted to the node"
    )
    .unwrap();

    pub static ref TX_DROPPED: CounterVec = register_counter_vec!(
        "txpool_requests_dropped_total",
        "Total requests dropped by pipeline stage",
        &["stage"]
    )
    .unwrap();

    pub static ref NONCE_REFRESHES: Counter = register_counter!(
        "txpool_nonce_refreshes_total",
        "Total stale-nonce refreshes against the node"
    )
    .unwrap();

    pub static ref BATCH_SIZE: Histogram = register_histogram!(
        "txpool_batch_size",
        "Requests drained per batch cycle",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0]
    )
    .unwrap();

    pub static ref BATCH_DURATION: Histogram = register_histogram!(
        "txpool_batch_duration_seconds",
        "Batch cycle duration",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap();

    pub static ref RECEIPTS: CounterVec = register_counter_vec!(
        "txpool_receipts_total",
        "Receipts observed in verified mode",
        &["outcome"]
    )
    .unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> PoolResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::PoolError::Config(e.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::PoolError::Config(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_enqueued() {
    TX_ENQUEUED.inc();
}

pub fn record_tx_sent() {
    TX_SENT.inc();
}

pub fn record_tx_dropped(stage: &str) {
    TX_DROPPED.with_label_values(&[stage]).inc();
}

pub fn record_nonce_refresh() {
    NONCE_REFRESHES.inc();
}

pub fn record_batch(size: usize, duration: Duration) {
    BATCH_SIZE.observe(size as f64);
    BATCH_DURATION.observe(duration.as_secs_f64());
}

pub fn record_receipt(succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    RECEIPTS.with_label_values(&[outcome]).inc();
}

pub fn record_receipt_abandoned() {
    RECEIPTS.with_label_values(&["abandoned"]).inc();
}
