//! Request counters.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! (tests, CLI commands) these are no-ops.

use metrics::counter;

pub(crate) fn record_request(service: &str, verb: &'static str, depth: &'static str) {
    counter!(
        "blobgate_requests_total",
        "service" => service.to_string(),
        "verb" => verb,
        "depth" => depth
    )
    .increment(1);
}

pub(crate) fn record_error(status: u16) {
    counter!("blobgate_request_errors_total", "status" => status.to_string()).increment(1);
}

pub(crate) fn record_upload(bytes: u64) {
    counter!("blobgate_uploaded_bytes_total").increment(bytes);
}

pub(crate) fn record_batch(kind: &'static str, items: usize, failures: usize) {
    counter!("blobgate_batch_items_total", "kind" => kind).increment(items as u64);
    counter!("blobgate_batch_failures_total", "kind" => kind).increment(failures as u64);
}
