//! Process-local counters. No exporter is wired up; counters are recorded
//! through the `metrics` facade so a recorder can be installed by the host
//! process if wanted.

use metrics::counter;

/// Count a rate-limit rejection for the given limiter scope
/// ("admin" or "ingest").
pub fn record_rate_limit_rejection(scope: &'static str) {
    counter!("rate_limit_rejections_total", "scope" => scope).increment(1);
}

/// Count an ingestion outcome ("created", "duplicate", or "rejected").
pub fn record_ingest_outcome(outcome: &'static str) {
    counter!("ingest_events_total", "outcome" => outcome).increment(1);
}
