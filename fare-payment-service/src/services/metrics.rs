//! Prometheus metrics for fare-payment-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Handle for the `metrics` facade recorder fed by the HTTP middleware.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Payment intents created, by payment type and outcome.
pub static PAYMENT_INTENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fare_payment_intents_total",
        "Total number of payment intent creations",
        &["payment_type", "outcome"]
    )
    .expect("Failed to register payment_intents_total")
});

/// Verification attempts by outcome (settled, or the error kind).
pub static VERIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fare_payment_verifications_total",
        "Total number of payment verifications",
        &["outcome"]
    )
    .expect("Failed to register verifications_total")
});

pub static SETTLEMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fare_payment_settlements_total",
        "Total number of settlements dispatched",
        &["payment_type", "outcome"]
    )
    .expect("Failed to register settlements_total")
});

pub static REFUNDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fare_payment_refunds_total",
        "Total number of compensating refunds",
        &["outcome"]
    )
    .expect("Failed to register refunds_total")
});

pub static LEDGER_ENTRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fare_payment_ledger_entries_total",
        "Total number of wallet ledger entries",
        &["transaction_type", "outcome"]
    )
    .expect("Failed to register ledger_entries_total")
});

pub static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fare_payment_gateway_request_duration_seconds",
        "Payment gateway request duration in seconds",
        &["operation"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register gateway_request_duration")
});

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fare_payment_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Install the HTTP metrics recorder once and force the lazy statics.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
        }
    }

    Lazy::force(&PAYMENT_INTENTS_TOTAL);
    Lazy::force(&VERIFICATIONS_TOTAL);
    Lazy::force(&SETTLEMENTS_TOTAL);
    Lazy::force(&REFUNDS_TOTAL);
    Lazy::force(&LEDGER_ENTRIES_TOTAL);
    Lazy::force(&GATEWAY_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
}

/// HTTP metrics followed by the engine metrics, in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let mut buffer = Vec::new();
    if TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .is_ok()
    {
        output.push_str(&String::from_utf8_lossy(&buffer));
    }

    output
}
