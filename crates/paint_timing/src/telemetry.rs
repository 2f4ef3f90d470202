//! Telemetry helpers for the final metric.
//! Kept independent of the coordinator internals; callers pass the metric explicitly.

use crate::reporter::FinalMetric;
use anyhow::{Context as _, Result};

/// Log target for telemetry lines.
pub const TARGET: &str = "paint_timing::telemetry";

pub fn final_metric_json(metric: &FinalMetric) -> Result<String> {
    serde_json::to_string(metric).context("serializing final metric")
}

pub fn maybe_emit(enabled: bool, json_line: &str) {
    if enabled {
        log::info!(target: TARGET, "{json_line}");
    }
}
