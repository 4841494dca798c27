//! Prometheus metrics for monitoring
//!
//! Exposes counters for:
//! - Transaction submission and confirmation
//! - Revert diagnosis
//! - Nonce allocation
//! - Contract cache misses
//! - Retry attempts
//!
//! The crate registers into the default registry; embedders expose the text
//! encoding from [`render`] on whatever listener they already run.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref TX_SUBMITTED: IntCounter = register_int_counter!(
        "txcourier_transactions_submitted_total",
        "Total transactions broadcast to the node"
    )
    .unwrap();

    pub static ref TX_CONFIRMED: IntCounter = register_int_counter!(
        "txcourier_transactions_confirmed_total",
        "Total transactions confirmed with status 1"
    )
    .unwrap();

    pub static ref TX_REVERTED: IntCounter = register_int_counter!(
        "txcourier_transactions_reverted_total",
        "Total transactions mined with status 0"
    )
    .unwrap();

    pub static ref NONCES_ALLOCATED: IntCounter = register_int_counter!(
        "txcourier_nonces_allocated_total",
        "Total nonces handed out"
    )
    .unwrap();

    pub static ref CONTRACT_CACHE_MISSES: IntCounter = register_int_counter!(
        "txcourier_contract_cache_misses_total",
        "Total contract handles constructed fresh"
    )
    .unwrap();

    pub static ref RETRY_ATTEMPTS: IntCounter = register_int_counter!(
        "txcourier_retry_attempts_total",
        "Total retried attempts across all retry call sites"
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_tx_submitted() {
    TX_SUBMITTED.inc();
}

pub fn record_tx_confirmed() {
    TX_CONFIRMED.inc();
}

pub fn record_tx_reverted() {
    TX_REVERTED.inc();
}

pub fn record_nonce_allocated() {
    NONCES_ALLOCATED.inc();
}

pub fn record_contract_cache_miss() {
    CONTRACT_CACHE_MISSES.inc();
}

pub fn record_retry_attempt() {
    RETRY_ATTEMPTS.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_counters() {
        record_tx_submitted();
        let text = render();
        assert!(text.contains("txcourier_transactions_submitted_total"));
    }
}
