//! Handler bookkeeping shared by host implementations.
//!
//! A host owns one [`HostRegistry`] and forwards whatever its environment
//! produces (DOM update batches, visibility entries, input, native records) to the
//! `dispatch_*` methods. The registry mirrors structure into a [`DomIndex`] so
//! mutation observers only see updates under their root, filters visibility
//! entries by each observer's targets and threshold, and buffers native records
//! for late buffered subscribers.
//!
//! Handlers are looked up again right before each invocation, so a handler
//! cancelled earlier in the same dispatch (or by the handler before it) is never
//! called afterwards.

use super::{
    InteractionEvent, InteractionHandler, InteractionKind, IntersectionEntry,
    IntersectionHandler, IntersectionObserver, MutationHandler, NativeHandler,
    NativeObserveOptions, TimerCallback,
};
use crate::record::{CandidateRecord, LCP_ENTRY_TYPE};
use crate::subscription::Subscription;
use core::cell::{Cell, RefCell};
use dom::{Ancestors, DOMSubscriber as _, DOMUpdate, DomIndex, NodeKey};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

/// Native records kept for buffered subscribers; the oldest are dropped first.
pub const NATIVE_BUFFER_LIMIT: usize = 150;

/// Live registrations, for teardown assertions and diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HostActivity {
    pub mutation_observers: usize,
    pub intersection_observers: usize,
    pub observed_targets: usize,
    pub listeners: usize,
    pub native_observers: usize,
    /// Timers armed and not yet fired or cancelled (filled in by the host).
    pub timers: usize,
}

impl HostActivity {
    /// Whether nothing is registered at all.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.mutation_observers == 0
            && self.intersection_observers == 0
            && self.observed_targets == 0
            && self.listeners == 0
            && self.native_observers == 0
            && self.timers == 0
    }
}

struct HandlerSet<W> {
    next_id: Cell<u64>,
    entries: RefCell<BTreeMap<u64, Rc<RefCell<W>>>>,
}

impl<W> HandlerSet<W> {
    fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            entries: RefCell::new(BTreeMap::new()),
        }
    }

    fn insert(&self, watch: W) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        self.entries.borrow_mut().insert(id, Rc::new(RefCell::new(watch)));
        id
    }

    fn remove(&self, id: u64) -> bool {
        // Dropping the handler may cancel further subscriptions; release the map first.
        let removed = self.entries.borrow_mut().remove(&id);
        removed.is_some()
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    fn get(&self, id: u64) -> Option<Rc<RefCell<W>>> {
        self.entries.borrow().get(&id).map(Rc::clone)
    }

    fn snapshot(&self) -> Vec<(u64, Rc<RefCell<W>>)> {
        self.entries
            .borrow()
            .iter()
            .map(|(id, watch)| (*id, Rc::clone(watch)))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn values(&self) -> Vec<Rc<RefCell<W>>> {
        self.entries.borrow().values().map(Rc::clone).collect()
    }

    /// Run `call` on a registered handler; returns whether it delivered anything.
    fn invoke(&self, id: u64, watch: &RefCell<W>, call: impl FnOnce(&mut W) -> bool) -> bool {
        if !self.contains(id) {
            return false;
        }
        let Ok(mut guard) = watch.try_borrow_mut() else {
            log::warn!("HostRegistry: handler {id} is already running; skipping re-entrant delivery");
            return false;
        };
        call(&mut guard)
    }
}

struct MutationWatch {
    root: NodeKey,
    handler: MutationHandler,
}

struct VisibilityWatch {
    targets: Rc<RefCell<BTreeSet<NodeKey>>>,
    threshold: f64,
    handler: IntersectionHandler,
}

impl VisibilityWatch {
    /// Hidden entries always pass; visible ones need at least `threshold` of the target shown.
    fn admits(&self, entry: &IntersectionEntry) -> bool {
        !entry.is_intersecting || entry.intersection_ratio >= self.threshold
    }
}

struct NativeWatch {
    handler: NativeHandler,
    /// Buffered records from before subscribing, until replayed.
    pending: Option<Vec<CandidateRecord>>,
}

impl NativeWatch {
    /// Deliver `batch`, preceded by the pending replay if it has not run yet.
    fn deliver(&mut self, batch: &[CandidateRecord]) {
        match self.pending.take() {
            Some(mut replay) => {
                replay.extend_from_slice(batch);
                (self.handler)(&replay);
            }
            None => (self.handler)(batch),
        }
    }
}

struct Listener {
    kind: InteractionKind,
    handler: InteractionHandler,
}

/// Shared handler registry and DOM mirror.
pub struct HostRegistry {
    index: RefCell<DomIndex>,
    mutations: HandlerSet<MutationWatch>,
    visibility: HandlerSet<VisibilityWatch>,
    listeners: HandlerSet<Listener>,
    native: HandlerSet<NativeWatch>,
    native_buffer: RefCell<Vec<CandidateRecord>>,
}

impl HostRegistry {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            index: RefCell::new(DomIndex::new()),
            mutations: HandlerSet::new(),
            visibility: HandlerSet::new(),
            listeners: HandlerSet::new(),
            native: HandlerSet::new(),
            native_buffer: RefCell::new(Vec::new()),
        })
    }

    /// Register a structural observer scoped to `root`.
    pub fn observe_mutations(self: &Rc<Self>, root: NodeKey, handler: MutationHandler) -> Subscription {
        let id = self.mutations.insert(MutationWatch { root, handler });
        let registry = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.mutations.remove(id);
            }
        })
    }

    /// Create a visibility observer with an initially empty target set.
    pub fn create_intersection_observer(
        self: &Rc<Self>,
        threshold: f64,
        handler: IntersectionHandler,
    ) -> Box<dyn IntersectionObserver> {
        let targets = Rc::new(RefCell::new(BTreeSet::new()));
        let id = self.visibility.insert(VisibilityWatch {
            targets: Rc::clone(&targets),
            threshold,
            handler,
        });
        Box::new(RegistryObserver {
            registry: Rc::downgrade(self),
            id,
            targets,
            threshold,
            disconnected: false,
        })
    }

    /// Register an input listener for one event kind.
    pub fn add_event_listener(
        self: &Rc<Self>,
        kind: InteractionKind,
        handler: InteractionHandler,
    ) -> Subscription {
        let id = self.listeners.insert(Listener { kind, handler });
        let registry = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.listeners.remove(id);
            }
        })
    }

    /// Register a native record observer. Returns `None` for entry types other than
    /// largest-contentful-paint. The returned id is used for buffered delivery.
    pub fn observe_native(
        self: &Rc<Self>,
        options: &NativeObserveOptions,
        handler: NativeHandler,
    ) -> Option<(u64, Subscription)> {
        if options.entry_type != LCP_ENTRY_TYPE {
            log::debug!("HostRegistry: unsupported native entry type '{}'", options.entry_type);
            return None;
        }
        let id = self.native.insert(NativeWatch {
            handler,
            pending: None,
        });
        let registry = Rc::downgrade(self);
        let subscription = Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.native.remove(id);
            }
        });
        Some((id, subscription))
    }

    /// Register a native observer and, for buffered options, hand the replay of
    /// already-recorded entries to `schedule` so it runs asynchronously.
    ///
    /// A live batch recorded before the replay runs carries the replayed records
    /// in front of it, so the handler always sees records in recording order.
    /// Cancelling the returned subscription also cancels a replay that has not run yet.
    pub fn observe_native_buffered(
        self: &Rc<Self>,
        options: &NativeObserveOptions,
        handler: NativeHandler,
        schedule: impl FnOnce(TimerCallback) -> Subscription,
    ) -> Option<Subscription> {
        let (id, mut live) = self.observe_native(options, handler)?;
        let recorded = self.native_buffer.borrow().clone();
        if !options.buffered || recorded.is_empty() {
            return Some(live);
        }
        if let Some(watch) = self.native.get(id) {
            watch.borrow_mut().pending = Some(recorded);
        }
        let registry = Rc::downgrade(self);
        let mut replay = schedule(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.deliver_buffered(id);
            }
        }));
        Some(Subscription::new(move || {
            live.cancel();
            replay.cancel();
        }))
    }

    /// Mirror a structural batch and deliver the in-scope part to each observer.
    pub fn dispatch_mutations(&self, batch: &[DOMUpdate]) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let chains = self.mirror(batch);
        let mut delivered = 0;
        for (id, watch) in self.mutations.snapshot() {
            let fired = self.mutations.invoke(id, &watch, |observer| {
                let scoped: Vec<DOMUpdate> = batch
                    .iter()
                    .zip(&chains)
                    .filter(|(_, chain)| in_scope(observer.root, chain.as_ref()))
                    .map(|(update, _)| update.clone())
                    .collect();
                if scoped.is_empty() {
                    return false;
                }
                (observer.handler)(&scoped);
                true
            });
            delivered += usize::from(fired);
        }
        delivered
    }

    /// Apply a batch to the index, recording each update's ancestor chain.
    ///
    /// Removals are located before they are applied, everything else after.
    fn mirror(&self, batch: &[DOMUpdate]) -> Vec<Option<Ancestors>> {
        let mut index = self.index.borrow_mut();
        let mut chains = Vec::with_capacity(batch.len());
        for update in batch {
            let removal = matches!(update, DOMUpdate::RemoveNode { .. });
            let before = removal.then(|| update.anchor().map(|anchor| index.ancestors(anchor)));
            if let Err(err) = index.apply_update(update.clone()) {
                log::warn!("HostRegistry: failed to mirror {update:?}: {err}");
            }
            let chain = before.unwrap_or_else(|| update.anchor().map(|anchor| index.ancestors(anchor)));
            chains.push(chain);
        }
        chains
    }

    /// Deliver visibility entries to the observers watching their targets.
    pub fn dispatch_intersections(&self, entries: &[IntersectionEntry]) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let mut delivered = 0;
        for (id, watch) in self.visibility.snapshot() {
            let fired = self.visibility.invoke(id, &watch, |observer| {
                let scoped: Vec<IntersectionEntry> = {
                    let targets = observer.targets.borrow();
                    entries
                        .iter()
                        .filter(|entry| targets.contains(&entry.target) && observer.admits(entry))
                        .copied()
                        .collect()
                };
                if scoped.is_empty() {
                    return false;
                }
                (observer.handler)(&scoped);
                true
            });
            delivered += usize::from(fired);
        }
        delivered
    }

    /// Deliver an input event to the listeners for its kind.
    pub fn dispatch_interaction(&self, event: &InteractionEvent) -> usize {
        let mut delivered = 0;
        for (id, listener) in self.listeners.snapshot() {
            let fired = self.listeners.invoke(id, &listener, |entry| {
                if entry.kind != event.kind {
                    return false;
                }
                (entry.handler)(event);
                true
            });
            delivered += usize::from(fired);
        }
        delivered
    }

    /// Append native records to the buffer and deliver them to live observers.
    pub fn record_native(&self, batch: &[CandidateRecord]) -> usize {
        if batch.is_empty() {
            return 0;
        }
        {
            let mut buffer = self.native_buffer.borrow_mut();
            buffer.extend_from_slice(batch);
            let overflow = buffer.len().saturating_sub(NATIVE_BUFFER_LIMIT);
            buffer.drain(..overflow);
        }
        let mut delivered = 0;
        for (id, watch) in self.native.snapshot() {
            let fired = self.native.invoke(id, &watch, |observer| {
                observer.deliver(batch);
                true
            });
            delivered += usize::from(fired);
        }
        delivered
    }

    /// Replay the records buffered before `id` subscribed, unless a live batch
    /// already carried them.
    pub fn deliver_buffered(&self, id: u64) -> bool {
        let Some(watch) = self.native.get(id) else {
            return false;
        };
        self.native.invoke(id, &watch, |observer| match observer.pending.take() {
            Some(replay) if !replay.is_empty() => {
                (observer.handler)(&replay);
                true
            }
            _ => false,
        })
    }

    /// Number of native records held for buffered subscribers.
    #[must_use]
    pub fn buffered_native(&self) -> usize {
        self.native_buffer.borrow().len()
    }

    /// Read access to the structural mirror.
    pub fn with_index<R>(&self, read: impl FnOnce(&DomIndex) -> R) -> R {
        read(&self.index.borrow())
    }

    /// Counts of live registrations; `timers` is left at zero.
    #[must_use]
    pub fn activity(&self) -> HostActivity {
        let observed_targets = self
            .visibility
            .values()
            .iter()
            .map(|watch| watch.try_borrow().map_or(0, |observer| observer.targets.borrow().len()))
            .sum();
        HostActivity {
            mutation_observers: self.mutations.len(),
            intersection_observers: self.visibility.len(),
            observed_targets,
            listeners: self.listeners.len(),
            native_observers: self.native.len(),
            timers: 0,
        }
    }
}

fn in_scope(root: NodeKey, chain: Option<&Ancestors>) -> bool {
    root == NodeKey::ROOT || chain.is_some_and(|chain| chain.contains(&root))
}

/// Observer handle backed by a registry entry.
struct RegistryObserver {
    registry: Weak<HostRegistry>,
    id: u64,
    targets: Rc<RefCell<BTreeSet<NodeKey>>>,
    threshold: f64,
    disconnected: bool,
}

impl IntersectionObserver for RegistryObserver {
    fn observe(&mut self, target: NodeKey) {
        if self.disconnected {
            return;
        }
        self.targets.borrow_mut().insert(target);
    }

    fn unobserve(&mut self, target: NodeKey) {
        self.targets.borrow_mut().remove(&target);
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        self.targets.borrow_mut().clear();
        if let Some(registry) = self.registry.upgrade() {
            registry.visibility.remove(self.id);
        }
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Drop for RegistryObserver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
