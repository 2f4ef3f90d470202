//! What the coordinator hands back to its caller.

use crate::host::InteractionKind;
use crate::record::CandidateRecord;
use crate::source::StrategyKind;
use core::cell::RefCell;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Why a run finalized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FinalizeReason {
    /// The quiet period elapsed with no further candidate update.
    QuietPeriod,
    /// The first qualifying user input arrived.
    Interaction { kind: InteractionKind },
    /// `MetricsCoordinator::finalize` was called.
    Manual,
}

/// The metric as reported once per run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalMetric {
    /// Last record received before finalizing, if any.
    pub record: Option<CandidateRecord>,
    pub reason: FinalizeReason,
    /// Host clock when the run finalized.
    pub finalized_at_ms: f64,
    /// Number of records received during the run.
    pub updates: u64,
    /// Strategy that produced the records; `None` when none could run.
    pub strategy: Option<StrategyKind>,
}

/// Receives interim candidates and the one final metric of a run.
pub trait MetricsReporter {
    /// Called synchronously for every record the active strategy produces.
    fn on_candidate(&mut self, record: &CandidateRecord);

    /// Called exactly once when the run finalizes.
    fn on_final(&mut self, _metric: &FinalMetric) {}
}

impl<F> MetricsReporter for F
where
    F: FnMut(&CandidateRecord),
{
    fn on_candidate(&mut self, record: &CandidateRecord) {
        self(record);
    }
}

/// Everything a [`RecordingReporter`] has seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportLog {
    pub candidates: Vec<CandidateRecord>,
    pub finals: Vec<FinalMetric>,
}

impl ReportLog {
    #[must_use]
    pub fn final_metric(&self) -> Option<&FinalMetric> {
        self.finals.first()
    }
}

/// Reporter that keeps every call in a shared log.
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    log: Rc<RefCell<ReportLog>>,
}

impl RecordingReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the log that stays valid after the reporter is moved into a coordinator.
    #[must_use]
    pub fn log(&self) -> Rc<RefCell<ReportLog>> {
        Rc::clone(&self.log)
    }
}

impl MetricsReporter for RecordingReporter {
    fn on_candidate(&mut self, record: &CandidateRecord) {
        self.log.borrow_mut().candidates.push(record.clone());
    }

    fn on_final(&mut self, metric: &FinalMetric) {
        self.log.borrow_mut().finals.push(metric.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reasons_serialize_with_a_type_tag() -> anyhow::Result<()> {
        assert_eq!(
            serde_json::to_value(FinalizeReason::QuietPeriod)?,
            json!({"type": "quiet-period"})
        );
        assert_eq!(
            serde_json::to_value(FinalizeReason::Interaction {
                kind: InteractionKind::KeyDown
            })?,
            json!({"type": "interaction", "kind": "keydown"})
        );
        Ok(())
    }

    #[test]
    fn closures_only_see_candidates() {
        let mut sizes = Vec::new();
        {
            let mut reporter = |record: &CandidateRecord| sizes.push(record.size);
            reporter.on_candidate(&CandidateRecord::synthetic(0.0, 9.0, dom::NodeKey(1)));
            reporter.on_final(&FinalMetric {
                record: None,
                reason: FinalizeReason::Manual,
                finalized_at_ms: 0.0,
                updates: 0,
                strategy: None,
            });
        }
        assert_eq!(sizes, vec![9.0]);
    }
}
