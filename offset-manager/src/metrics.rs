//! Per-SSP gauges and commit counters, emitted through the shared
//! `common_metrics` facade the rest of the reference runtime's workspace
//! uses (`common_metrics::gauge`/`inc` wrap the `metrics` crate's global
//! recorder) rather than a crate-local registry.

use crate::model::Ssp;

fn labels(ssp: &Ssp) -> [(String, String); 3] {
    [
        ("system".to_string(), ssp.system().to_string()),
        ("stream".to_string(), ssp.stream().to_string()),
        ("partition".to_string(), ssp.partition.to_string()),
    ]
}

/// Creates the per-SSP checkpoint-offset gauge, empty, at registration time.
pub fn init_offset_gauge(ssp: &Ssp) {
    common_metrics::gauge("checkpoint_offset", &labels(ssp), f64::NAN);
}

/// Records the numeric value of a committed offset. Non-numeric offsets (most
/// broker offsets are decimal integers, but the core treats them as opaque)
/// are silently skipped, matching "unknown SSPs are silently skipped" for the
/// gauge-update step of the commit pipeline.
pub fn record_offset(ssp: &Ssp, offset: &str) {
    if let Ok(value) = offset.parse::<f64>() {
        common_metrics::gauge("checkpoint_offset", &labels(ssp), value);
    }
}

pub fn startpoint_resolution_failed(system: &str) {
    let labels = [("system".to_string(), system.to_string())];
    common_metrics::inc("startpoint_resolution_failed_total", &labels, 1);
}

pub fn startpoint_fan_out_removed(task: &str) {
    let labels = [("task".to_string(), task.to_string())];
    common_metrics::inc("startpoint_fan_out_removed_total", &labels, 1);
}
