//! Measurement strategy, chosen once per run.

use crate::config::MetricsConfig;
use crate::host::{Host, NativeObserveOptions};
use crate::record::CandidateRecord;
use crate::subscription::Subscription;
use crate::tracker::CandidateTracker;
use core::fmt;
use dom::NodeKey;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Where records for the current run come from.
pub type RecordSink = Rc<dyn Fn(&CandidateRecord)>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Native,
    Fallback,
}

impl StrategyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Subscription to the host's own largest-contentful-paint records.
pub struct NativePaintSource {
    subscription: Subscription,
}

impl NativePaintSource {
    /// Subscribe with buffering. Each non-empty batch forwards only its last record.
    pub fn subscribe(host: &dyn Host, sink: RecordSink) -> Option<Self> {
        let subscription = host.observe_native(
            &NativeObserveOptions::largest_contentful_paint(),
            Box::new(move |batch: &[CandidateRecord]| {
                let Some(latest) = batch.last() else {
                    return;
                };
                log::debug!(
                    "NativePaintSource: {} record(s), latest size={} at {}ms",
                    batch.len(),
                    latest.size,
                    latest.start_time
                );
                sink(latest);
            }),
        )?;
        Some(Self { subscription })
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_active()
    }

    pub fn disconnect(&mut self) {
        self.subscription.cancel();
    }
}

pub enum MeasurementSource {
    Native(NativePaintSource),
    Fallback(CandidateTracker),
}

impl MeasurementSource {
    /// Pick native records when the host has them, otherwise the fallback tracker
    /// bound to the document root. `None` when neither can run on this host.
    pub fn select(host: &Rc<dyn Host>, config: &MetricsConfig, sink: RecordSink) -> Option<Self> {
        if host.supports_native_paint_timing() {
            if let Some(native) = NativePaintSource::subscribe(&**host, Rc::clone(&sink)) {
                log::info!("MeasurementSource: using native paint timing");
                return Some(Self::Native(native));
            }
            log::info!("MeasurementSource: native probe passed but subscribing failed; falling back");
        }
        let tracker = CandidateTracker::new(Rc::clone(host), NodeKey::ROOT, config, move |record| {
            sink(record);
        });
        if tracker.observe() {
            log::info!("MeasurementSource: using fallback candidate tracker");
            Some(Self::Fallback(tracker))
        } else {
            log::info!("MeasurementSource: host offers no usable strategy");
            None
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::Native(_) => StrategyKind::Native,
            Self::Fallback(_) => StrategyKind::Fallback,
        }
    }

    /// Stop delivering records. Idempotent.
    pub fn disconnect(&mut self) {
        match self {
            Self::Native(native) => native.disconnect(),
            Self::Fallback(tracker) => tracker.disconnect(),
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::Native(native) => native.is_connected(),
            Self::Fallback(tracker) => tracker.is_observing(),
        }
    }
}
