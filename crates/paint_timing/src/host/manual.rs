//! A deterministic host driven by explicit calls.
//!
//! Time only moves when the caller advances it, timers run in (due time, arm
//! order) and every injected event is dispatched synchronously at the current
//! virtual time. Used by the test suites and the replay tool.

use super::registry::{HostActivity, HostRegistry};
use super::{
    Host, InteractionEvent, InteractionHandler, InteractionKind, IntersectionEntry,
    IntersectionHandler, IntersectionObserver, MutationHandler, NativeHandler,
    NativeObserveOptions, Rect, TimerCallback,
};
use crate::record::CandidateRecord;
use crate::subscription::Subscription;
use core::cell::{Cell, RefCell};
use core::time::Duration;
use dom::{DOMUpdate, NodeKey};
use std::rc::Rc;

/// Which primitives the host exposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub native_paint_timing: bool,
    pub mutation_observer: bool,
    pub intersection_observer: bool,
    pub input_events: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            native_paint_timing: false,
            mutation_observer: true,
            intersection_observer: true,
            input_events: true,
        }
    }
}

impl Capabilities {
    /// Everything, including native paint timing.
    #[must_use]
    pub fn native() -> Self {
        Self {
            native_paint_timing: true,
            ..Self::default()
        }
    }

    /// Nothing at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            native_paint_timing: false,
            mutation_observer: false,
            intersection_observer: false,
            input_events: false,
        }
    }
}

struct ScheduledTask {
    id: u64,
    due: f64,
    callback: TimerCallback,
}

#[derive(Default)]
struct TaskQueue {
    next_id: Cell<u64>,
    pending: RefCell<Vec<ScheduledTask>>,
}

impl TaskQueue {
    fn schedule(&self, due: f64, callback: TimerCallback) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        self.pending
            .borrow_mut()
            .push(ScheduledTask { id, due, callback });
        id
    }

    fn cancel(&self, id: u64) -> bool {
        let removed = {
            let mut pending = self.pending.borrow_mut();
            let pos = pending.iter().position(|task| task.id == id);
            pos.map(|pos| pending.remove(pos))
        };
        removed.is_some()
    }

    /// Remove and return the earliest task due at or before `until`.
    fn pop_due(&self, until: f64) -> Option<ScheduledTask> {
        let mut pending = self.pending.borrow_mut();
        let pos = pending
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= until)
            .min_by(|(_, lhs), (_, rhs)| lhs.due.total_cmp(&rhs.due).then(lhs.id.cmp(&rhs.id)))
            .map(|(pos, _)| pos)?;
        Some(pending.remove(pos))
    }

    fn next_due(&self) -> Option<f64> {
        self.pending
            .borrow()
            .iter()
            .map(|task| task.due)
            .min_by(f64::total_cmp)
    }

    fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}

/// Virtual-clock host.
pub struct ManualHost {
    registry: Rc<HostRegistry>,
    tasks: Rc<TaskQueue>,
    clock: Cell<f64>,
    capabilities: Cell<Capabilities>,
}

impl ManualHost {
    /// Host with the default capabilities (no native paint timing) at t=0.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_capabilities(Capabilities::default())
    }

    #[must_use]
    pub fn with_capabilities(capabilities: Capabilities) -> Rc<Self> {
        Rc::new(Self {
            registry: HostRegistry::new(),
            tasks: Rc::new(TaskQueue::default()),
            clock: Cell::new(0.0),
            capabilities: Cell::new(capabilities),
        })
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.get()
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.capabilities.set(capabilities);
    }

    /// Run every timer due at or before `target_ms`, then move the clock there.
    ///
    /// The clock never moves backwards. Returns the number of timers that ran.
    pub fn advance_to(&self, target_ms: f64) -> usize {
        let mut ran = 0;
        while let Some(task) = self.tasks.pop_due(target_ms) {
            if task.due > self.clock.get() {
                self.clock.set(task.due);
            }
            (task.callback)();
            ran += 1;
        }
        if target_ms > self.clock.get() {
            self.clock.set(target_ms);
        }
        ran
    }

    pub fn advance_by(&self, delta_ms: f64) -> usize {
        self.advance_to(self.clock.get() + delta_ms)
    }

    /// Run zero-delay work queued at the current time.
    pub fn flush(&self) -> usize {
        self.advance_to(self.clock.get())
    }

    /// Run timers until none are left. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(due) = self.tasks.next_due() {
            ran += self.advance_to(due);
        }
        ran
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.tasks.len()
    }

    /// Dispatch a structural batch at the current time.
    pub fn apply(&self, batch: &[DOMUpdate]) -> usize {
        self.registry.dispatch_mutations(batch)
    }

    /// Append an element under `parent`.
    pub fn insert_element(&self, parent: NodeKey, node: NodeKey, tag: &str) -> usize {
        self.apply(&[DOMUpdate::element(parent, node, tag)])
    }

    pub fn remove_node(&self, node: NodeKey) -> usize {
        self.apply(&[DOMUpdate::RemoveNode { node }])
    }

    /// Dispatch visibility entries at the current time.
    pub fn intersect(&self, entries: &[IntersectionEntry]) -> usize {
        self.registry.dispatch_intersections(entries)
    }

    /// Report `target` as intersecting the viewport with the given bounds.
    pub fn show(&self, target: NodeKey, bounds: Rect) -> usize {
        self.intersect(&[IntersectionEntry::visible(target, bounds)])
    }

    /// Report `target` as outside the viewport.
    pub fn hide(&self, target: NodeKey, bounds: Rect) -> usize {
        self.intersect(&[IntersectionEntry::hidden(target, bounds)])
    }

    /// Dispatch a user input event at the current time.
    pub fn interact(&self, kind: InteractionKind) -> usize {
        self.registry.dispatch_interaction(&InteractionEvent {
            kind,
            time_ms: self.clock.get(),
        })
    }

    /// Record native paint entries; live observers get them immediately.
    pub fn record_native(&self, batch: &[CandidateRecord]) -> usize {
        self.registry.record_native(batch)
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<HostRegistry> {
        &self.registry
    }

    /// Live registrations, including armed timers.
    #[must_use]
    pub fn activity(&self) -> HostActivity {
        HostActivity {
            timers: self.tasks.len(),
            ..self.registry.activity()
        }
    }
}

impl Host for ManualHost {
    fn now_ms(&self) -> f64 {
        self.clock.get()
    }

    fn supports_native_paint_timing(&self) -> bool {
        self.capabilities.get().native_paint_timing
    }

    fn observe_native(
        &self,
        options: &NativeObserveOptions,
        handler: NativeHandler,
    ) -> Option<Subscription> {
        if !self.capabilities.get().native_paint_timing {
            return None;
        }
        self.registry
            .observe_native_buffered(options, handler, |replay| {
                self.set_timeout(Duration::ZERO, replay)
            })
    }

    fn observe_mutations(&self, root: NodeKey, handler: MutationHandler) -> Option<Subscription> {
        self.capabilities
            .get()
            .mutation_observer
            .then(|| self.registry.observe_mutations(root, handler))
    }

    fn create_intersection_observer(
        &self,
        threshold: f64,
        handler: IntersectionHandler,
    ) -> Option<Box<dyn IntersectionObserver>> {
        self.capabilities
            .get()
            .intersection_observer
            .then(|| self.registry.create_intersection_observer(threshold, handler))
    }

    fn add_event_listener(
        &self,
        kind: InteractionKind,
        handler: InteractionHandler,
    ) -> Option<Subscription> {
        self.capabilities
            .get()
            .input_events
            .then(|| self.registry.add_event_listener(kind, handler))
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> Subscription {
        let due = self.clock.get() + delay.as_secs_f64() * 1000.0;
        let id = self.tasks.schedule(due, callback);
        let tasks = Rc::downgrade(&self.tasks);
        Subscription::new(move || {
            if let Some(tasks) = tasks.upgrade() {
                tasks.cancel(id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_run_in_due_then_arm_order() {
        let host = ManualHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut keep = Vec::new();
        for (label, delay) in [("late", 30), ("first", 10), ("second", 10)] {
            let sink = Rc::clone(&log);
            let stamp = Rc::clone(&host);
            keep.push(host.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || sink.borrow_mut().push((label, stamp.now_ms()))),
            ));
        }
        assert_eq!(host.advance_to(20.0), 2);
        assert_eq!(host.now_ms(), 20.0);
        assert_eq!(host.run_until_idle(), 1);
        assert_eq!(
            log.borrow().as_slice(),
            &[("first", 10.0), ("second", 10.0), ("late", 30.0)]
        );
    }

    #[test]
    fn cancelled_timer_never_runs() {
        let host = ManualHost::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let mut timer = host.set_timeout(
            Duration::from_millis(5),
            Box::new(move || flag.set(true)),
        );
        assert_eq!(host.activity().timers, 1);
        timer.cancel();
        assert_eq!(host.advance_by(10.0), 0);
        assert!(!fired.get());
        assert!(host.activity().is_idle());
    }

    #[test]
    fn clock_never_moves_backwards() {
        let host = ManualHost::new();
        host.advance_to(100.0);
        host.advance_to(50.0);
        assert_eq!(host.now_ms(), 100.0);
    }

    #[test]
    fn missing_primitives_yield_none() {
        let host = ManualHost::with_capabilities(Capabilities::none());
        assert!(host.observe_mutations(NodeKey::ROOT, Box::new(|_batch: &[DOMUpdate]| {})).is_none());
        assert!(host
            .create_intersection_observer(0.0, Box::new(|_entries: &[IntersectionEntry]| {}))
            .is_none());
        assert!(host
            .add_event_listener(InteractionKind::Click, Box::new(|_event: &InteractionEvent| {}))
            .is_none());
        assert!(host
            .observe_native(
                &NativeObserveOptions::largest_contentful_paint(),
                Box::new(|_records: &[CandidateRecord]| {})
            )
            .is_none());
    }
}
