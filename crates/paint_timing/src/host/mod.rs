//! The environment seam.
//!
//! Everything the tracker and coordinator need from the page (clock, timers,
//! structural updates, visibility, input and native paint records) is reached
//! through [`Host`]. Every registration hands back a [`Subscription`], and a
//! `None` return means the host lacks that primitive.

use crate::record::{CandidateRecord, LCP_ENTRY_TYPE};
use crate::subscription::Subscription;
use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use dom::{DOMUpdate, NodeKey};
use serde::{Deserialize, Serialize};

/// Tokio `LocalSet` host fed by channels.
pub mod local;
/// Deterministic virtual-clock host.
pub mod manual;
/// Handler bookkeeping shared by the hosts.
pub mod registry;

pub use local::{HostFeeds, LocalRuntimeHost};
pub use manual::ManualHost;
pub use registry::{HostActivity, HostRegistry};

pub type MutationHandler = Box<dyn FnMut(&[DOMUpdate])>;
pub type IntersectionHandler = Box<dyn FnMut(&[IntersectionEntry])>;
pub type NativeHandler = Box<dyn FnMut(&[CandidateRecord])>;
pub type InteractionHandler = Box<dyn FnMut(&InteractionEvent)>;
pub type TimerCallback = Box<dyn FnOnce()>;

/// Axis-aligned rectangle in CSS pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin.
    #[must_use]
    pub const fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// `width * height`, with negative extents counted as empty.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// One visibility change for an observed element.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntersectionEntry {
    pub target: NodeKey,
    pub bounding_rect: Rect,
    /// Whether any part of the target is inside the viewport.
    pub is_intersecting: bool,
    /// Visible fraction of the target, in `[0, 1]`. Observers drop visible
    /// entries whose ratio is below their threshold.
    pub intersection_ratio: f64,
}

impl IntersectionEntry {
    /// Fully inside the viewport.
    #[must_use]
    pub const fn visible(target: NodeKey, bounding_rect: Rect) -> Self {
        Self::partial(target, bounding_rect, 1.0)
    }

    /// Inside the viewport with only `ratio` of the target showing.
    #[must_use]
    pub const fn partial(target: NodeKey, bounding_rect: Rect, ratio: f64) -> Self {
        Self {
            target,
            bounding_rect,
            is_intersecting: true,
            intersection_ratio: ratio,
        }
    }

    #[must_use]
    pub const fn hidden(target: NodeKey, bounding_rect: Rect) -> Self {
        Self {
            target,
            bounding_rect,
            is_intersecting: false,
            intersection_ratio: 0.0,
        }
    }
}

/// User input kinds a host can deliver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    /// Primary pointer activation.
    Click,
    /// Key press.
    KeyDown,
    KeyUp,
    #[serde(rename = "mousemove")]
    PointerMove,
    TextInput,
}

impl InteractionKind {
    /// DOM event type name.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::KeyDown => "keydown",
            Self::KeyUp => "keyup",
            Self::PointerMove => "mousemove",
            Self::TextInput => "textinput",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.event_type())
    }
}

impl FromStr for InteractionKind {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "keydown" => Ok(Self::KeyDown),
            "keyup" => Ok(Self::KeyUp),
            "mousemove" => Ok(Self::PointerMove),
            "textinput" => Ok(Self::TextInput),
            other => Err(anyhow::anyhow!("unknown interaction kind '{other}'")),
        }
    }
}

/// A delivered input event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    /// Host clock at dispatch, in milliseconds.
    pub time_ms: f64,
}

/// Options for a native paint record subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeObserveOptions {
    pub entry_type: String,
    /// Deliver records recorded before the subscription existed.
    pub buffered: bool,
}

impl NativeObserveOptions {
    /// Buffered largest-contentful-paint records.
    #[must_use]
    pub fn largest_contentful_paint() -> Self {
        Self {
            entry_type: LCP_ENTRY_TYPE.to_owned(),
            buffered: true,
        }
    }
}

/// Handle to a host visibility observer.
pub trait IntersectionObserver {
    /// Start reporting visibility changes for `target`. Observing twice is a no-op.
    fn observe(&mut self, target: NodeKey);
    /// Stop reporting for `target`.
    fn unobserve(&mut self, target: NodeKey);
    /// Stop reporting for every target. Idempotent.
    fn disconnect(&mut self);
    /// Threshold this observer was created with.
    fn threshold(&self) -> f64;
}

/// Capabilities consumed from the hosting environment.
pub trait Host {
    /// Monotonic clock in milliseconds.
    fn now_ms(&self) -> f64;

    /// Whether native buffered largest-contentful-paint records are available.
    fn supports_native_paint_timing(&self) -> bool;

    /// Subscribe to native paint records.
    fn observe_native(
        &self,
        options: &NativeObserveOptions,
        handler: NativeHandler,
    ) -> Option<Subscription>;

    /// Subscribe to structural updates anywhere under `root`.
    fn observe_mutations(&self, root: NodeKey, handler: MutationHandler) -> Option<Subscription>;

    /// Create a visibility observer; targets are added through the returned handle.
    fn create_intersection_observer(
        &self,
        threshold: f64,
        handler: IntersectionHandler,
    ) -> Option<Box<dyn IntersectionObserver>>;

    /// Listen for one kind of user input.
    fn add_event_listener(
        &self,
        kind: InteractionKind,
        handler: InteractionHandler,
    ) -> Option<Subscription>;

    /// Run `callback` once after `delay`, unless the subscription is cancelled first.
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> Subscription;
}
