//! DOM identity and structural-update primitives shared by the paint timing crates.
//!
//! Nodes are identified by stable [`NodeKey`] values that never borrow the tree they
//! came from. Structural changes travel as batches of [`DOMUpdate`] values and are
//! mirrored by [`DOMSubscriber`] implementations such as [`DomIndex`].

use core::hash::Hash;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Parent/tag index mirror used for subtree membership queries.
pub mod index;
pub use index::{Ancestors, DomIndex};

/// A 64-bit stable key for DOM nodes used to correlate asynchronous updates.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The document root key (always present).
    pub const ROOT: Self = Self(0);

    /// Pack epoch+shard+counter into a single 64-bit key.
    #[inline]
    #[must_use]
    pub const fn pack(epoch: u16, shard: u8, counter: u64) -> Self {
        let masked = counter & ((1_u64 << 40) - 1);
        Self(((epoch as u64) << 48) | ((shard as u64) << 40) | masked)
    }

    /// Extract epoch from the key.
    #[inline]
    #[must_use]
    pub const fn epoch(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// Extract shard from the key.
    #[inline]
    #[must_use]
    pub const fn shard(self) -> u8 {
        ((self.0 >> 40) & 0xFF) as u8
    }

    /// Extract counter from the key.
    #[inline]
    #[must_use]
    pub const fn counter(self) -> u64 {
        self.0 & ((1_u64 << 40) - 1)
    }
}

/// Global key space for minting `NodeKey`s with a shared epoch and unique shard ids.
#[derive(Debug)]
pub struct KeySpace {
    epoch: u16,
    next_shard_id: u8,
}

impl KeySpace {
    /// Create a new key space with a time-derived epoch.
    #[must_use]
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let epoch = (((now.as_secs() as u32) ^ now.subsec_nanos()) & 0xFFFF) as u16;
        Self::with_epoch(epoch)
    }

    /// Create a key space with a fixed epoch, for reproducible key values.
    #[must_use]
    pub const fn with_epoch(epoch: u16) -> Self {
        Self {
            epoch,
            next_shard_id: 1,
        }
    }

    /// Register a new manager for a given producer shard.
    pub fn register_manager<L: Eq + Hash + Copy>(&mut self) -> NodeKeyManager<L> {
        let shard = self.next_shard_id;
        self.next_shard_id = self.next_shard_id.wrapping_add(1);
        NodeKeyManager::new(self.epoch, shard)
    }

    /// Return the current epoch.
    #[must_use]
    pub const fn epoch(&self) -> u16 {
        self.epoch
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-shard manager mapping local ids to `NodeKey`s and minting new keys.
#[derive(Clone, Debug)]
pub struct NodeKeyManager<L: Eq + Hash + Copy> {
    epoch: u16,
    shard: u8,
    counter: u64,
    map: HashMap<L, NodeKey>,
}

impl<L: Eq + Hash + Copy> NodeKeyManager<L> {
    fn new(epoch: u16, shard: u8) -> Self {
        Self {
            epoch,
            shard,
            counter: 1,
            map: HashMap::new(),
        }
    }

    /// Get the `NodeKey` for a local id, minting if not present.
    #[inline]
    pub fn key_of(&mut self, id: L) -> NodeKey {
        if let Some(&key) = self.map.get(&id) {
            return key;
        }
        let key = NodeKey::pack(self.epoch, self.shard, self.counter);
        self.counter = self.counter.wrapping_add(1);
        self.map.insert(id, key);
        key
    }

    /// Seed a mapping from a local id to an existing `NodeKey`.
    #[inline]
    pub fn seed(&mut self, id: L, key: NodeKey) {
        self.map.insert(id, key);
    }

    /// Number of local ids currently mapped.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no local id has been mapped yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A batchable structural update applied to the runtime DOM and mirrored to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DOMUpdate {
    InsertElement {
        parent: NodeKey,
        node: NodeKey,
        tag: String,
        pos: usize,
    },
    InsertText {
        parent: NodeKey,
        node: NodeKey,
        text: String,
        pos: usize,
    },
    SetAttr {
        node: NodeKey,
        name: String,
        value: String,
    },
    RemoveNode {
        node: NodeKey,
    },
    EndOfDocument,
}

impl DOMUpdate {
    /// Shorthand for appending an element at the end of `parent`'s children.
    pub fn element(parent: NodeKey, node: NodeKey, tag: impl Into<String>) -> Self {
        Self::InsertElement {
            parent,
            node,
            tag: tag.into(),
            pos: usize::MAX,
        }
    }

    /// The node this update introduces into the tree, if it is an insertion.
    #[must_use]
    pub const fn inserted_node(&self) -> Option<NodeKey> {
        match self {
            Self::InsertElement { node, .. } | Self::InsertText { node, .. } => Some(*node),
            Self::SetAttr { .. } | Self::RemoveNode { .. } | Self::EndOfDocument => None,
        }
    }

    /// The node whose position in the tree decides which subtree this update belongs to.
    ///
    /// Insertions are anchored at their parent, everything else at the node itself.
    #[must_use]
    pub const fn anchor(&self) -> Option<NodeKey> {
        match self {
            Self::InsertElement { parent, .. } | Self::InsertText { parent, .. } => Some(*parent),
            Self::SetAttr { node, .. } | Self::RemoveNode { node } => Some(*node),
            Self::EndOfDocument => None,
        }
    }
}

/// A subscriber that receives `DOMUpdate` values and mirrors them into its own state.
pub trait DOMSubscriber {
    /// Apply a single `DOMUpdate` to the subscriber state.
    ///
    /// # Errors
    /// Returns an error if the subscriber cannot incorporate the update.
    fn apply_update(&mut self, update: DOMUpdate) -> anyhow::Result<()>;
}
