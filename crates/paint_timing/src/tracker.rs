//! Fallback largest-contentful-paint heuristic.
//!
//! Without native paint timing, the tracker watches for allowlisted elements being
//! inserted under its root, observes their visibility, and emits a synthetic
//! record each time a visible element's bounding box is strictly larger than every
//! one seen before. Elements leaving the viewport never retract an emission.

use crate::bridge::ObservationBridge;
use crate::config::{CandidateAllowlist, MetricsConfig};
use crate::host::{Host, IntersectionEntry};
use crate::record::CandidateRecord;
use core::cell::{Cell, RefCell};
use dom::{DOMUpdate, NodeKey};
use std::rc::{Rc, Weak};

/// Receives every new largest candidate, synchronously.
pub type RecordCallback = Box<dyn FnMut(&CandidateRecord)>;

/// Largest candidate seen so far.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackerState {
    /// Only ever increases; starts at 0.
    pub largest_area: f64,
    pub largest_record: Option<CandidateRecord>,
}

struct TrackerInner {
    host: Rc<dyn Host>,
    root: NodeKey,
    allowlist: CandidateAllowlist,
    threshold: f64,
    state: RefCell<TrackerState>,
    callback: RefCell<RecordCallback>,
    bridge: RefCell<Option<ObservationBridge>>,
    disconnected: Cell<bool>,
    emissions: Cell<u64>,
}

impl TrackerInner {
    fn on_structural_change(&self, batch: &[DOMUpdate]) {
        if self.disconnected.get() {
            return;
        }
        for update in batch {
            let DOMUpdate::InsertElement { node, tag, .. } = update else {
                continue;
            };
            if !self.allowlist.contains(tag) {
                log::trace!("CandidateTracker: ignoring <{tag}> {node:?}");
                continue;
            }
            let mut bridge = self.bridge.borrow_mut();
            if let Some(bridge) = bridge.as_mut() {
                if bridge.observe_target(*node) {
                    log::trace!("CandidateTracker: watching <{tag}> {node:?}");
                }
            }
        }
    }

    fn on_visibility_change(&self, entries: &[IntersectionEntry]) {
        for entry in entries {
            if self.disconnected.get() {
                break;
            }
            if !entry.is_intersecting {
                continue;
            }
            let area = entry.bounding_rect.area();
            let record = {
                let mut state = self.state.borrow_mut();
                if area.is_nan() || area <= state.largest_area {
                    continue;
                }
                state.largest_area = area;
                let record = CandidateRecord::synthetic(self.host.now_ms(), area, entry.target);
                state.largest_record = Some(record.clone());
                record
            };
            self.emissions.set(self.emissions.get() + 1);
            log::debug!(
                "CandidateTracker: new largest candidate {:?} area={} at {}ms",
                entry.target,
                area,
                record.start_time
            );
            let Ok(mut callback) = self.callback.try_borrow_mut() else {
                log::warn!("CandidateTracker: callback re-entered; dropping update for {:?}", entry.target);
                continue;
            };
            (*callback)(&record);
        }
    }
}

/// Fallback candidate tracker bound to an explicit root.
pub struct CandidateTracker {
    inner: Rc<TrackerInner>,
}

impl CandidateTracker {
    /// Build an idle tracker; call [`Self::observe`] to start watching.
    pub fn new(
        host: Rc<dyn Host>,
        root: NodeKey,
        config: &MetricsConfig,
        callback: impl FnMut(&CandidateRecord) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(TrackerInner {
                host,
                root,
                allowlist: config.candidate_allowlist.clone(),
                threshold: config.threshold(),
                state: RefCell::new(TrackerState::default()),
                callback: RefCell::new(Box::new(callback)),
                bridge: RefCell::new(None),
                disconnected: Cell::new(false),
                emissions: Cell::new(0),
            }),
        }
    }

    /// Subscribe to insertions under the root and create the visibility observer.
    ///
    /// Returns whether the tracker is observing afterwards; a host missing either
    /// primitive leaves it inert.
    pub fn observe(&self) -> bool {
        if self.inner.disconnected.get() {
            return false;
        }
        if self.inner.bridge.borrow().is_some() {
            return true;
        }
        let structure = Rc::downgrade(&self.inner);
        let visibility = Weak::clone(&structure);
        let bridge = ObservationBridge::connect(
            &*self.inner.host,
            self.inner.root,
            self.inner.threshold,
            Box::new(move |batch: &[DOMUpdate]| {
                if let Some(inner) = structure.upgrade() {
                    inner.on_structural_change(batch);
                }
            }),
            Box::new(move |entries: &[IntersectionEntry]| {
                if let Some(inner) = visibility.upgrade() {
                    inner.on_visibility_change(entries);
                }
            }),
        );
        let observing = bridge.is_some();
        *self.inner.bridge.borrow_mut() = bridge;
        observing
    }

    /// Register newly inserted allowlisted elements for visibility tracking.
    pub fn on_structural_change(&self, batch: &[DOMUpdate]) {
        self.inner.on_structural_change(batch);
    }

    /// Emit a record for each visible entry larger than the current maximum.
    pub fn on_visibility_change(&self, entries: &[IntersectionEntry]) {
        self.inner.on_visibility_change(entries);
    }

    /// Cancel both subscriptions. Idempotent; nothing is emitted afterwards.
    pub fn disconnect(&self) {
        if self.inner.disconnected.replace(true) {
            return;
        }
        let bridge = self.inner.bridge.borrow_mut().take();
        if let Some(mut bridge) = bridge {
            bridge.disconnect();
        }
        log::debug!(
            "CandidateTracker: disconnected after {} emissions",
            self.inner.emissions.get()
        );
    }

    pub fn is_observing(&self) -> bool {
        !self.inner.disconnected.get() && self.inner.bridge.borrow().is_some()
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.disconnected.get()
    }

    pub fn root(&self) -> NodeKey {
        self.inner.root
    }

    pub fn largest_area(&self) -> f64 {
        self.inner.state.borrow().largest_area
    }

    pub fn largest_record(&self) -> Option<CandidateRecord> {
        self.inner.state.borrow().largest_record.clone()
    }

    pub fn state(&self) -> TrackerState {
        self.inner.state.borrow().clone()
    }

    /// Number of records emitted so far.
    pub fn emissions(&self) -> u64 {
        self.inner.emissions.get()
    }

    /// Elements currently registered for visibility tracking.
    pub fn observed_targets(&self) -> Vec<NodeKey> {
        self.inner
            .bridge
            .borrow()
            .as_ref()
            .map(|bridge| bridge.observed_targets().iter().copied().collect())
            .unwrap_or_default()
    }
}
