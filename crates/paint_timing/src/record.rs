//! Largest-contentful-paint records and their flat JSON form.

use anyhow::{Context as _, Result};
use dom::NodeKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry type carried by every largest-contentful-paint record.
pub const LCP_ENTRY_TYPE: &str = "largest-contentful-paint";

/// One largest-so-far paint candidate, either synthesized by the tracker or
/// handed over by a native paint timing source.
///
/// The element reference is identity only and is not part of the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub entry_type: String,
    /// Milliseconds on the host's monotonic clock.
    pub start_time: f64,
    /// Visible area in square CSS pixels.
    pub size: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub name: String,
    #[serde(skip)]
    pub element: Option<NodeKey>,
}

impl CandidateRecord {
    /// A record detected by the fallback heuristic at `observed_at_ms`.
    #[must_use]
    pub fn synthetic(observed_at_ms: f64, area: f64, element: NodeKey) -> Self {
        Self {
            entry_type: LCP_ENTRY_TYPE.to_owned(),
            start_time: observed_at_ms,
            size: area,
            duration: 0.0,
            name: String::new(),
            element: Some(element),
        }
    }

    /// Alias for `size`.
    #[must_use]
    pub const fn area(&self) -> f64 {
        self.size
    }

    /// Alias for `start_time`.
    #[must_use]
    pub const fn observed_at_ms(&self) -> f64 {
        self.start_time
    }
}

/// Flat structural snapshot of a record.
#[must_use]
pub fn to_value(record: &CandidateRecord) -> Value {
    serde_json::json!({
        "entryType": record.entry_type,
        "startTime": record.start_time,
        "size": record.size,
        "duration": record.duration,
        "name": record.name,
    })
}

/// Serialize a record to its flat JSON string.
///
/// # Errors
/// Returns an error if a numeric field cannot be represented in JSON.
pub fn to_json(record: &CandidateRecord) -> Result<String> {
    serde_json::to_string(record).context("serialize paint record")
}

/// Parse a flat JSON record. The element reference is always absent afterwards.
///
/// # Errors
/// Returns an error if the input is not a JSON object with the record fields.
pub fn from_json(input: &str) -> Result<CandidateRecord> {
    serde_json::from_str(input).context("parse paint record")
}
