//! Tokio host for a single-threaded `LocalSet`.
//!
//! Structural updates arrive on the same `broadcast` channel of `DOMUpdate`
//! batches that feeds every other DOM mirror; visibility entries, input and
//! native paint records arrive on unbounded `mpsc` channels. Each source is
//! drained by its own local pump task, so handlers still run one at a time on
//! the `LocalSet` thread. Timers are local sleep tasks aborted on cancel.
//!
//! [`LocalRuntimeHost::spawn`] must be called from inside a `LocalSet`.

use super::registry::{HostActivity, HostRegistry};
use super::{
    Host, InteractionEvent, InteractionHandler, InteractionKind, IntersectionEntry,
    IntersectionHandler, IntersectionObserver, MutationHandler, NativeHandler,
    NativeObserveOptions, TimerCallback,
};
use crate::record::CandidateRecord;
use crate::subscription::Subscription;
use core::cell::{Cell, RefCell};
use core::time::Duration;
use dom::{DOMUpdate, NodeKey};
use std::rc::{Rc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, spawn_local};
use tokio::time::{Instant, sleep};
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::{Stream, StreamExt as _};

/// Sending halves for the non-DOM event sources.
#[derive(Clone, Debug)]
pub struct HostFeeds {
    pub intersections: mpsc::UnboundedSender<Vec<IntersectionEntry>>,
    pub input: mpsc::UnboundedSender<InteractionKind>,
    pub native: mpsc::UnboundedSender<Vec<CandidateRecord>>,
}

/// Host backed by tokio channels and timers.
pub struct LocalRuntimeHost {
    registry: Rc<HostRegistry>,
    origin: Instant,
    native_supported: bool,
    pumps: RefCell<Vec<JoinHandle<()>>>,
    live_timers: Rc<Cell<usize>>,
}

impl LocalRuntimeHost {
    /// Start the pump tasks and return the host plus the feeds for the other sources.
    ///
    /// `native_supported` is what the capability probe answers; records sent on
    /// the native feed are buffered either way.
    pub fn spawn(
        dom_updates: broadcast::Receiver<Vec<DOMUpdate>>,
        native_supported: bool,
    ) -> (Rc<Self>, HostFeeds) {
        let (intersections_tx, intersections_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (native_tx, native_rx) = mpsc::unbounded_channel();

        let host = Rc::new(Self {
            registry: HostRegistry::new(),
            origin: Instant::now(),
            native_supported,
            pumps: RefCell::new(Vec::new()),
            live_timers: Rc::new(Cell::new(0)),
        });

        let registry = Rc::downgrade(&host.registry);
        let origin = host.origin;
        let pumps = vec![
            pump(
                Weak::clone(&registry),
                BroadcastStream::new(dom_updates),
                |registry, item| match item {
                    Ok(batch) => {
                        registry.dispatch_mutations(&batch);
                    }
                    Err(err) => {
                        log::warn!("LocalRuntimeHost: DOM update stream: {err}");
                    }
                },
            ),
            pump(
                Weak::clone(&registry),
                UnboundedReceiverStream::new(intersections_rx),
                |registry, entries: Vec<IntersectionEntry>| {
                    registry.dispatch_intersections(&entries);
                },
            ),
            pump(
                Weak::clone(&registry),
                UnboundedReceiverStream::new(input_rx),
                move |registry, kind| {
                    registry.dispatch_interaction(&InteractionEvent {
                        kind,
                        time_ms: elapsed_ms(origin),
                    });
                },
            ),
            pump(
                registry,
                UnboundedReceiverStream::new(native_rx),
                |registry, records: Vec<CandidateRecord>| {
                    registry.record_native(&records);
                },
            ),
        ];
        *host.pumps.borrow_mut() = pumps;

        let feeds = HostFeeds {
            intersections: intersections_tx,
            input: input_tx,
            native: native_tx,
        };
        (host, feeds)
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<HostRegistry> {
        &self.registry
    }

    /// Live registrations, including armed timers.
    #[must_use]
    pub fn activity(&self) -> HostActivity {
        HostActivity {
            timers: self.live_timers.get(),
            ..self.registry.activity()
        }
    }
}

impl Drop for LocalRuntimeHost {
    fn drop(&mut self) {
        for handle in self.pumps.get_mut().drain(..) {
            handle.abort();
        }
    }
}

fn elapsed_ms(origin: Instant) -> f64 {
    origin.elapsed().as_secs_f64() * 1000.0
}

/// Drain `stream` into the registry until the stream ends or the registry is gone.
fn pump<S, T, F>(registry: Weak<HostRegistry>, stream: S, mut dispatch: F) -> JoinHandle<()>
where
    S: Stream<Item = T> + 'static,
    T: 'static,
    F: FnMut(&HostRegistry, T) + 'static,
{
    spawn_local(async move {
        let mut stream = Box::pin(stream);
        while let Some(item) = stream.next().await {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            dispatch(&registry, item);
        }
    })
}

impl Host for LocalRuntimeHost {
    fn now_ms(&self) -> f64 {
        elapsed_ms(self.origin)
    }

    fn supports_native_paint_timing(&self) -> bool {
        self.native_supported
    }

    fn observe_native(
        &self,
        options: &NativeObserveOptions,
        handler: NativeHandler,
    ) -> Option<Subscription> {
        if !self.native_supported {
            return None;
        }
        self.registry
            .observe_native_buffered(options, handler, |replay| {
                self.set_timeout(Duration::ZERO, replay)
            })
    }

    fn observe_mutations(&self, root: NodeKey, handler: MutationHandler) -> Option<Subscription> {
        Some(self.registry.observe_mutations(root, handler))
    }

    fn create_intersection_observer(
        &self,
        threshold: f64,
        handler: IntersectionHandler,
    ) -> Option<Box<dyn IntersectionObserver>> {
        Some(self.registry.create_intersection_observer(threshold, handler))
    }

    fn add_event_listener(
        &self,
        kind: InteractionKind,
        handler: InteractionHandler,
    ) -> Option<Subscription> {
        Some(self.registry.add_event_listener(kind, handler))
    }

    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> Subscription {
        let live = Rc::clone(&self.live_timers);
        live.set(live.get() + 1);
        let settled = Rc::new(Cell::new(false));

        let task_settled = Rc::clone(&settled);
        let task_live = Rc::clone(&live);
        let handle = spawn_local(async move {
            sleep(delay).await;
            if !task_settled.replace(true) {
                task_live.set(task_live.get().saturating_sub(1));
            }
            callback();
        });

        Subscription::new(move || {
            handle.abort();
            if !settled.replace(true) {
                live.set(live.get().saturating_sub(1));
            }
        })
    }
}
