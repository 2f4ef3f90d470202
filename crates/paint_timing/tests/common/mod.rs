#![allow(dead_code, reason = "shared by several test binaries, each using a subset")]
use core::cell::RefCell;
use std::rc::Rc;

use dom::NodeKey;
use paint_timing::host::manual::Capabilities;
use paint_timing::host::{IntersectionEntry, Rect};
use paint_timing::{Host, ManualHost, MetricsConfig, MetricsCoordinator, RecordingReporter, ReportLog};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn as_host(host: &Rc<ManualHost>) -> Rc<dyn Host> {
    Rc::clone(host) as Rc<dyn Host>
}

/// A running coordinator on a manual host with the given capabilities.
pub struct Harness {
    pub host: Rc<ManualHost>,
    pub coordinator: MetricsCoordinator,
    pub log: Rc<RefCell<ReportLog>>,
}

impl Harness {
    pub fn start(capabilities: Capabilities, config: MetricsConfig) -> Self {
        init_logging();
        let host = ManualHost::with_capabilities(capabilities);
        let reporter = RecordingReporter::new();
        let log = reporter.log();
        let coordinator = MetricsCoordinator::run_metrics(as_host(&host), config, reporter);
        Self {
            host,
            coordinator,
            log,
        }
    }

    /// Fallback strategy, default config.
    pub fn fallback() -> Self {
        Self::start(Capabilities::default(), MetricsConfig::default())
    }

    pub fn native() -> Self {
        Self::start(Capabilities::native(), MetricsConfig::default())
    }

    /// Insert `tag` under the root at the current time.
    pub fn insert(&self, node: u64, tag: &str) {
        self.host.insert_element(NodeKey::ROOT, NodeKey(node), tag);
    }

    /// Report `node` visible with a `width x height` box at the current time.
    pub fn show(&self, node: u64, width: f64, height: f64) {
        self.host.show(NodeKey(node), Rect::sized(width, height));
    }

    pub fn candidate_sizes(&self) -> Vec<f64> {
        self.log.borrow().candidates.iter().map(|record| record.size).collect()
    }

    pub fn finals(&self) -> usize {
        self.log.borrow().finals.len()
    }
}

pub fn visible(node: u64, width: f64, height: f64) -> IntersectionEntry {
    IntersectionEntry::visible(NodeKey(node), Rect::sized(width, height))
}

pub fn hidden(node: u64, width: f64, height: f64) -> IntersectionEntry {
    IntersectionEntry::hidden(NodeKey(node), Rect::sized(width, height))
}
