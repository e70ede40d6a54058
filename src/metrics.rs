use prometheus::{register_counter, register_counter_vec, Counter, CounterVec, Opts, TextEncoder};
use std::sync::LazyLock;

use crate::errors::{Error, Result};

// Counters
pub static PDUS_DECODED: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        Opts::new(
            "pnrsi_pdus_decoded_total",
            "The total number of decoded RSI PDUs by RTA type"
        ),
        &["kind"]
    )
    .unwrap()
});

pub static FRAGMENTS_ADDED: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(Opts::new(
        "pnrsi_fragments_total",
        "The total number of fragments added to a reassembly"
    ))
    .unwrap()
});

pub static REASSEMBLIES_COMPLETED: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(Opts::new(
        "pnrsi_reassemblies_total",
        "The total number of completed reassemblies"
    ))
    .unwrap()
});

pub static TRUNCATED_PDUS: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(Opts::new(
        "pnrsi_truncated_pdus_total",
        "The total number of PDUs whose decoding stopped at a truncated field"
    ))
    .unwrap()
});

/// Initialize all metrics with default values
pub fn init_metrics() {
    for kind in ["ack", "err", "freq", "frsp", "reserved", "encrypted"] {
        PDUS_DECODED.with_label_values(&[kind]).inc_by(0.0);
    }
    FRAGMENTS_ADDED.inc_by(0.0);
    REASSEMBLIES_COMPLETED.inc_by(0.0);
    TRUNCATED_PDUS.inc_by(0.0);
}

/// Render the default registry in the prometheus text format.
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Error::Metrics)
}
