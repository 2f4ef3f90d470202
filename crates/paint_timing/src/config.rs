//! Configuration for paint timing measurement.
//!
//! Values can be constructed programmatically, deserialized from camelCase JSON
//! (missing keys take their defaults) or loaded from environment variables.

use core::time::Duration;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;

/// Quiet period after the last candidate update before the metric is final.
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 5000;

/// Tags eligible as fallback candidates: images, media, frames, headings, paragraphs and list items.
pub const DEFAULT_CANDIDATE_TAGS: [&str; 12] = [
    "img", "image", "video", "iframe", "h1", "h2", "h3", "h4", "h5", "h6", "p", "li",
];

/// Set of element tags the fallback tracker considers. Tags are stored lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct CandidateAllowlist {
    tags: BTreeSet<String>,
}

impl CandidateAllowlist {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|tag| tag.as_ref().trim().to_ascii_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive membership check.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        if tag.bytes().any(|byte| byte.is_ascii_uppercase()) {
            self.tags.contains(&tag.to_ascii_lowercase())
        } else {
            self.tags.contains(tag)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for CandidateAllowlist {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATE_TAGS)
    }
}

impl From<Vec<String>> for CandidateAllowlist {
    fn from(tags: Vec<String>) -> Self {
        Self::new(tags)
    }
}

/// Runtime configuration for one measurement run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsConfig {
    /// Debounce window in milliseconds; each candidate update restarts it.
    pub quiet_period_ms: u64,
    /// Visibility ratio handed to the host's intersection observer.
    pub intersection_threshold: f64,
    /// Tags eligible for the fallback heuristic.
    pub candidate_allowlist: CandidateAllowlist,
    /// Whether to log the final metric as a telemetry JSON line.
    pub telemetry_enabled: bool,
}

impl MetricsConfig {
    /// Construct a config with explicit values. The threshold is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(
        quiet_period_ms: u64,
        intersection_threshold: f64,
        candidate_allowlist: CandidateAllowlist,
        telemetry_enabled: bool,
    ) -> Self {
        Self {
            quiet_period_ms,
            intersection_threshold: clamp_threshold(intersection_threshold),
            candidate_allowlist,
            telemetry_enabled,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `PAINT_TIMING_QUIET_PERIOD_MS`: debounce window (default: 5000)
    /// - `PAINT_TIMING_INTERSECTION_THRESHOLD`: observer threshold (default: 0.0)
    /// - `PAINT_TIMING_CANDIDATES`: comma-separated tag list (default: built-in allowlist)
    /// - `PAINT_TIMING_TELEMETRY`: set to "1" to log the final metric as JSON
    ///
    /// Missing or unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let quiet_period_ms = lookup("PAINT_TIMING_QUIET_PERIOD_MS")
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_QUIET_PERIOD_MS);
        let intersection_threshold = lookup("PAINT_TIMING_INTERSECTION_THRESHOLD")
            .and_then(|val| val.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        let candidate_allowlist = lookup("PAINT_TIMING_CANDIDATES")
            .map(|val| CandidateAllowlist::new(val.split(',')))
            .filter(|list| !list.is_empty())
            .unwrap_or_default();
        let telemetry_enabled = lookup("PAINT_TIMING_TELEMETRY").as_deref() == Some("1");
        Self::new(
            quiet_period_ms,
            intersection_threshold,
            candidate_allowlist,
            telemetry_enabled,
        )
    }

    /// Get the quiet period as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Threshold clamped into `[0, 1]`, whatever was deserialized.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        clamp_threshold(self.intersection_threshold)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_QUIET_PERIOD_MS,
            0.0,
            CandidateAllowlist::default(),
            false,
        )
    }
}

fn clamp_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 1.0)
    }
}
