//! Run orchestration: strategy selection, quiet-period debounce and
//! finalize-once.
//!
//! A run moves `Idle -> Measuring -> Finalized`. While measuring, every record
//! from the active [`MeasurementSource`] restarts the quiet timer and is passed
//! to the reporter. The run finalizes on the first of: the quiet timer firing,
//! a click or key press, or an explicit [`MetricsCoordinator::finalize`].
//! Finalizing tears down the source, the input listeners and the timer before
//! the reporter sees the [`FinalMetric`], and happens at most once.
//!
//! Host handlers only hold weak references to the run. Dropping the
//! [`MetricsCoordinator`] ends measurement without reporting.

use crate::config::MetricsConfig;
use crate::debounce::QuietTimer;
use crate::host::{Host, InteractionEvent, InteractionKind};
use crate::record::CandidateRecord;
use crate::reporter::{FinalMetric, FinalizeReason, MetricsReporter};
use crate::source::{MeasurementSource, RecordSink, StrategyKind};
use crate::subscription::SubscriptionGroup;
use crate::telemetry;
use core::cell::RefCell;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::rc::{Rc, Weak};

/// Input kinds that end a run.
pub const FINALIZE_TRIGGERS: [InteractionKind; 2] = [InteractionKind::Click, InteractionKind::KeyDown];

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Measuring,
    Finalized,
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Idle => "idle",
            Self::Measuring => "measuring",
            Self::Finalized => "finalized",
        })
    }
}

#[derive(Default)]
struct CoordinatorState {
    phase: Phase,
    last_record: Option<CandidateRecord>,
    updates: u64,
    strategy: Option<StrategyKind>,
    final_metric: Option<FinalMetric>,
}

struct CoordinatorInner {
    host: Rc<dyn Host>,
    config: MetricsConfig,
    state: RefCell<CoordinatorState>,
    source: RefCell<Option<MeasurementSource>>,
    interactions: RefCell<SubscriptionGroup>,
    quiet: RefCell<QuietTimer>,
    reporter: RefCell<Box<dyn MetricsReporter>>,
    /// Final metric waiting for the reporter to be free.
    undelivered: RefCell<Option<FinalMetric>>,
}

impl CoordinatorInner {
    fn run(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Idle {
                log::debug!("MetricsCoordinator: run() ignored in phase {}", state.phase);
                return;
            }
            state.phase = Phase::Measuring;
        }

        let weak = Rc::downgrade(self);
        let sink: RecordSink = Rc::new(move |record: &CandidateRecord| {
            if let Some(inner) = weak.upgrade() {
                inner.on_record(record);
            }
        });
        let source = MeasurementSource::select(&self.host, &self.config, sink);
        let kind = source.as_ref().map(MeasurementSource::kind);
        self.state.borrow_mut().strategy = kind;
        *self.source.borrow_mut() = source;
        if kind.is_none() {
            log::info!("MetricsCoordinator: no strategy available, metric will have no record");
        }

        for trigger in FINALIZE_TRIGGERS {
            let weak = Rc::downgrade(self);
            let listener = self.host.add_event_listener(
                trigger,
                Box::new(move |event: &InteractionEvent| {
                    if let Some(inner) = weak.upgrade() {
                        inner.finalize(FinalizeReason::Interaction { kind: event.kind });
                    }
                }),
            );
            match listener {
                Some(listener) => self.interactions.borrow_mut().push(listener),
                None => log::debug!("MetricsCoordinator: host cannot listen for {trigger}"),
            }
        }
    }

    fn on_record(self: &Rc<Self>, record: &CandidateRecord) {
        {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Measuring {
                log::trace!("MetricsCoordinator: record ignored in phase {}", state.phase);
                return;
            }
            state.last_record = Some(record.clone());
            state.updates = state.updates.saturating_add(1);
        }

        let weak: Weak<Self> = Rc::downgrade(self);
        self.quiet.borrow_mut().reset(
            &*self.host,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.finalize(FinalizeReason::QuietPeriod);
                }
            }),
        );

        match self.reporter.try_borrow_mut() {
            Ok(mut reporter) => reporter.on_candidate(record),
            Err(_) => log::warn!("MetricsCoordinator: reporter busy; dropping interim update"),
        }
        // The reporter may have finalized from inside on_candidate.
        self.deliver_final();
    }

    fn finalize(&self, reason: FinalizeReason) -> bool {
        let (record, updates, strategy) = {
            let mut state = self.state.borrow_mut();
            if state.phase != Phase::Measuring {
                return false;
            }
            state.phase = Phase::Finalized;
            (state.last_record.clone(), state.updates, state.strategy)
        };

        let source = self.source.borrow_mut().take();
        if let Some(mut source) = source {
            source.disconnect();
        }
        self.interactions.borrow_mut().cancel_all();
        self.quiet.borrow_mut().cancel();

        let metric = FinalMetric {
            record,
            reason,
            finalized_at_ms: self.host.now_ms(),
            updates,
            strategy,
        };
        log::info!(
            "MetricsCoordinator: finalized ({reason:?}) at {}ms after {updates} update(s)",
            metric.finalized_at_ms
        );
        if self.config.telemetry_enabled {
            match telemetry::final_metric_json(&metric) {
                Ok(line) => telemetry::maybe_emit(true, &line),
                Err(err) => log::warn!("MetricsCoordinator: telemetry skipped: {err:#}"),
            }
        }
        self.state.borrow_mut().final_metric = Some(metric.clone());
        *self.undelivered.borrow_mut() = Some(metric);
        self.deliver_final();
        true
    }

    fn deliver_final(&self) {
        let Ok(mut reporter) = self.reporter.try_borrow_mut() else {
            return;
        };
        let metric = self.undelivered.borrow_mut().take();
        if let Some(metric) = metric {
            reporter.on_final(&metric);
        }
    }
}

/// Owner of one measurement run.
pub struct MetricsCoordinator {
    inner: Rc<CoordinatorInner>,
}

impl MetricsCoordinator {
    pub fn new(
        host: Rc<dyn Host>,
        config: MetricsConfig,
        reporter: impl MetricsReporter + 'static,
    ) -> Self {
        let quiet = QuietTimer::new(config.quiet_period());
        Self {
            inner: Rc::new(CoordinatorInner {
                host,
                config,
                state: RefCell::new(CoordinatorState::default()),
                source: RefCell::new(None),
                interactions: RefCell::new(SubscriptionGroup::new()),
                quiet: RefCell::new(quiet),
                reporter: RefCell::new(Box::new(reporter)),
                undelivered: RefCell::new(None),
            }),
        }
    }

    /// Build a coordinator and start it.
    pub fn run_metrics(
        host: Rc<dyn Host>,
        config: MetricsConfig,
        reporter: impl MetricsReporter + 'static,
    ) -> Self {
        let coordinator = Self::new(host, config, reporter);
        coordinator.run();
        coordinator
    }

    /// Select a strategy and start listening. Only the first call does anything.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Finalize now. Returns false if the run is not measuring (never started or
    /// already finalized).
    pub fn finalize(&self) -> bool {
        self.inner.finalize(FinalizeReason::Manual)
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.borrow().phase
    }

    pub fn is_finalized(&self) -> bool {
        self.phase() == Phase::Finalized
    }

    pub fn last_record(&self) -> Option<CandidateRecord> {
        self.inner.state.borrow().last_record.clone()
    }

    /// Strategy chosen by `run`, if any.
    pub fn strategy(&self) -> Option<StrategyKind> {
        self.inner.state.borrow().strategy
    }

    /// Records received while measuring.
    pub fn updates(&self) -> u64 {
        self.inner.state.borrow().updates
    }

    pub fn final_metric(&self) -> Option<FinalMetric> {
        self.inner.state.borrow().final_metric.clone()
    }

    /// How often a pending quiet timer was restarted.
    pub fn quiet_resets(&self) -> u64 {
        self.inner.quiet.borrow().resets()
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ManualHost, Rect};
    use crate::reporter::RecordingReporter;
    use dom::NodeKey;

    fn start(host: &Rc<ManualHost>) -> (MetricsCoordinator, RecordingReporter) {
        let reporter = RecordingReporter::new();
        let shared: Rc<dyn Host> = Rc::clone(host) as Rc<dyn Host>;
        let coordinator = MetricsCoordinator::run_metrics(shared, MetricsConfig::default(), reporter.clone());
        (coordinator, reporter)
    }

    #[test]
    fn phases_advance_once() {
        let host = ManualHost::new();
        let (coordinator, reporter) = start(&host);
        assert_eq!(coordinator.phase(), Phase::Measuring);
        coordinator.run();
        assert!(coordinator.finalize());
        assert!(!coordinator.finalize());
        assert_eq!(coordinator.phase(), Phase::Finalized);
        assert_eq!(reporter.log().borrow().finals.len(), 1);
    }

    #[test]
    fn finalize_before_run_is_ignored() {
        let host = ManualHost::new();
        let shared: Rc<dyn Host> = Rc::clone(&host) as Rc<dyn Host>;
        let coordinator = MetricsCoordinator::new(shared, MetricsConfig::default(), |_record: &CandidateRecord| {});
        assert!(!coordinator.finalize());
        assert_eq!(coordinator.phase(), Phase::Idle);
        assert!(host.activity().is_idle());
    }

    #[test]
    fn dropping_the_coordinator_releases_the_host() {
        let host = ManualHost::new();
        let (coordinator, reporter) = start(&host);
        host.insert_element(NodeKey::ROOT, NodeKey(1), "img");
        host.show(NodeKey(1), Rect::sized(10.0, 10.0));
        assert!(!host.activity().is_idle());
        drop(coordinator);
        assert!(host.activity().is_idle());
        host.run_until_idle();
        assert!(reporter.log().borrow().finals.is_empty());
    }

    #[test]
    fn reporter_may_finalize_from_a_candidate() {
        let host = ManualHost::new();
        let slot: Rc<RefCell<Option<Rc<MetricsCoordinator>>>> = Rc::new(RefCell::new(None));
        let recording = RecordingReporter::new();
        let log = recording.log();

        struct FinalizeOnFirst {
            slot: Rc<RefCell<Option<Rc<MetricsCoordinator>>>>,
            inner: RecordingReporter,
        }
        impl MetricsReporter for FinalizeOnFirst {
            fn on_candidate(&mut self, record: &CandidateRecord) {
                self.inner.on_candidate(record);
                let coordinator = self.slot.borrow().clone();
                if let Some(coordinator) = coordinator {
                    coordinator.finalize();
                }
            }
            fn on_final(&mut self, metric: &FinalMetric) {
                self.inner.on_final(metric);
            }
        }

        let shared: Rc<dyn Host> = Rc::clone(&host) as Rc<dyn Host>;
        let coordinator = Rc::new(MetricsCoordinator::new(
            shared,
            MetricsConfig::default(),
            FinalizeOnFirst {
                slot: Rc::clone(&slot),
                inner: recording,
            },
        ));
        *slot.borrow_mut() = Some(Rc::clone(&coordinator));
        coordinator.run();
        host.insert_element(NodeKey::ROOT, NodeKey(1), "img");
        host.show(NodeKey(1), Rect::sized(10.0, 10.0));

        assert!(coordinator.is_finalized());
        assert_eq!(log.borrow().candidates.len(), 1);
        assert_eq!(log.borrow().finals.len(), 1);
        assert_eq!(host.pending_timers(), 0);
        slot.borrow_mut().take();
    }
}
