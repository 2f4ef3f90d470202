//! Largest-contentful-paint estimation for a single page.
//!
//! A [`MetricsCoordinator`] picks one measurement strategy per run: the host's
//! native paint records when they are available, otherwise a [`CandidateTracker`]
//! that watches allowlisted elements being inserted and becoming visible. Every
//! candidate restarts a quiet-period timer; the run finalizes when that timer
//! elapses or on the first click or key press, and reports a [`FinalMetric`]
//! exactly once.
//!
//! The environment is reached through the [`Host`] trait. [`ManualHost`] drives
//! everything from explicit calls on a virtual clock; [`LocalRuntimeHost`] runs on
//! a tokio `LocalSet` fed by channels.

/// Structural and visibility subscriptions behind the tracker.
pub mod bridge;
pub mod config;
pub mod coordinator;
/// Restartable quiet-period timer.
pub mod debounce;
pub mod host;
pub mod record;
pub mod reporter;
/// Native or fallback measurement, chosen once per run.
pub mod source;
pub mod subscription;
pub mod telemetry;
pub mod tracker;

pub use bridge::ObservationBridge;
pub use config::{CandidateAllowlist, MetricsConfig};
pub use coordinator::{MetricsCoordinator, Phase};
pub use debounce::QuietTimer;
pub use host::{Host, LocalRuntimeHost, ManualHost};
pub use record::CandidateRecord;
pub use reporter::{FinalMetric, FinalizeReason, MetricsReporter, RecordingReporter, ReportLog};
pub use source::{MeasurementSource, StrategyKind};
pub use subscription::{Subscription, SubscriptionGroup};
pub use tracker::{CandidateTracker, TrackerState};
