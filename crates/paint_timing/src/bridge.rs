//! The two host subscriptions behind the fallback tracker.
//!
//! One structural subscription reports insertions under the root; one visibility
//! observer reports viewport changes for the elements registered with it. Both
//! are created together and torn down together.

use crate::host::{Host, IntersectionHandler, IntersectionObserver, MutationHandler};
use crate::subscription::Subscription;
use dom::NodeKey;
use std::collections::BTreeSet;

pub struct ObservationBridge {
    structure: Subscription,
    visibility: Box<dyn IntersectionObserver>,
    targets: BTreeSet<NodeKey>,
    connected: bool,
}

impl ObservationBridge {
    /// Create both subscriptions, or neither if the host lacks either primitive.
    pub fn connect(
        host: &dyn Host,
        root: NodeKey,
        threshold: f64,
        on_structure: MutationHandler,
        on_visibility: IntersectionHandler,
    ) -> Option<Self> {
        let Some(mut visibility) = host.create_intersection_observer(threshold, on_visibility) else {
            log::debug!("ObservationBridge: host has no intersection observer");
            return None;
        };
        let Some(structure) = host.observe_mutations(root, on_structure) else {
            log::debug!("ObservationBridge: host has no mutation observer");
            visibility.disconnect();
            return None;
        };
        Some(Self {
            structure,
            visibility,
            targets: BTreeSet::new(),
            connected: true,
        })
    }

    /// Start watching visibility of `node`. Returns false if it was already watched
    /// or the bridge is disconnected.
    pub fn observe_target(&mut self, node: NodeKey) -> bool {
        if !self.connected || !self.targets.insert(node) {
            return false;
        }
        self.visibility.observe(node);
        true
    }

    pub fn observed_targets(&self) -> &BTreeSet<NodeKey> {
        &self.targets
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Cancel both subscriptions. Idempotent.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.structure.cancel();
        self.visibility.disconnect();
        self.targets.clear();
    }
}

impl Drop for ObservationBridge {
    fn drop(&mut self) {
        self.disconnect();
    }
}
