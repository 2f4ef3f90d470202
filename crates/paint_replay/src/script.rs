//! Event scripts and their replay against a [`ManualHost`].

use anyhow::{Context as _, Result};
use dom::{DOMUpdate, KeySpace, NodeKey, NodeKeyManager};
use paint_timing::host::manual::Capabilities;
use paint_timing::host::{InteractionKind, IntersectionEntry, Rect};
use paint_timing::{
    CandidateRecord, FinalMetric, Host, ManualHost, MetricsConfig, MetricsCoordinator, RecordingReporter,
};
use serde::Deserialize;
use serde_json::json;
use std::rc::Rc;

/// A recorded page load.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    #[serde(default)]
    pub config: Option<MetricsConfig>,
    /// Whether the host offers native paint records.
    #[serde(default)]
    pub native: bool,
    /// Virtual time to run until after the last event.
    #[serde(default)]
    pub until: Option<f64>,
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptEvent {
    /// Virtual time in milliseconds.
    pub at: f64,
    #[serde(flatten)]
    pub action: Action,
}

/// Node ids are script-local; 0 is the document root.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Insert { parent: u64, node: u64, tag: String },
    Remove { node: u64 },
    Intersect {
        node: u64,
        width: f64,
        height: f64,
        #[serde(default = "intersecting_by_default")]
        intersecting: bool,
        /// Visible fraction; fully visible when omitted.
        #[serde(default)]
        ratio: Option<f64>,
    },
    Input { kind: InteractionKind },
    Native { records: Vec<CandidateRecord> },
    Finalize,
}

const fn intersecting_by_default() -> bool {
    true
}

/// Command-line overrides applied on top of the script.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub quiet_ms: Option<u64>,
    pub native: bool,
}

/// What a replay produced.
#[derive(Debug)]
pub struct Outcome {
    pub candidates: Vec<CandidateRecord>,
    pub final_metric: Option<FinalMetric>,
}

pub fn parse(input: &str) -> Result<Script> {
    serde_json::from_str(input).context("parsing replay script")
}

struct Keys {
    manager: NodeKeyManager<u64>,
}

impl Keys {
    fn new() -> Self {
        let mut manager = KeySpace::with_epoch(1).register_manager::<u64>();
        manager.seed(0, NodeKey::ROOT);
        Self { manager }
    }

    fn key(&mut self, id: u64) -> NodeKey {
        self.manager.key_of(id)
    }
}

/// Run `script` on a fresh manual host and collect the reports.
pub fn replay(script: Script, overrides: &Overrides) -> Result<Outcome> {
    let mut config = script.config.unwrap_or_default();
    if let Some(quiet_ms) = overrides.quiet_ms {
        config.quiet_period_ms = quiet_ms;
    }
    let quiet_ms = config.quiet_period_ms;
    let capabilities = if script.native || overrides.native {
        Capabilities::native()
    } else {
        Capabilities::default()
    };

    let host = ManualHost::with_capabilities(capabilities);
    let reporter = RecordingReporter::new();
    let log = reporter.log();
    let coordinator = MetricsCoordinator::run_metrics(Rc::clone(&host) as Rc<dyn Host>, config, reporter);
    log::info!("paint_replay: strategy {:?}", coordinator.strategy());

    let mut events = script.events;
    events.sort_by(|lhs, rhs| lhs.at.total_cmp(&rhs.at));
    let last_at = events.last().map_or(0.0, |event| event.at);

    let mut keys = Keys::new();
    for event in events {
        host.advance_to(event.at);
        match event.action {
            Action::Insert { parent, node, tag } => {
                let update = DOMUpdate::element(keys.key(parent), keys.key(node), tag);
                host.apply(&[update]);
            }
            Action::Remove { node } => {
                host.remove_node(keys.key(node));
            }
            Action::Intersect {
                node,
                width,
                height,
                intersecting,
                ratio,
            } => {
                let (target, bounds) = (keys.key(node), Rect::sized(width, height));
                let entry = if intersecting {
                    IntersectionEntry::partial(target, bounds, ratio.unwrap_or(1.0))
                } else {
                    IntersectionEntry::hidden(target, bounds)
                };
                host.intersect(&[entry]);
            }
            Action::Input { kind } => {
                host.interact(kind);
            }
            Action::Native { records } => {
                host.record_native(&records);
            }
            Action::Finalize => {
                coordinator.finalize();
            }
        }
    }
    let until = script.until.unwrap_or(last_at + quiet_ms as f64);
    host.advance_to(until);

    let candidates = log.borrow().candidates.clone();
    Ok(Outcome {
        candidates,
        final_metric: coordinator.final_metric(),
    })
}

/// One JSON line per candidate, then the final metric (or null).
pub fn render(outcome: &Outcome) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(outcome.candidates.len() + 1);
    for record in &outcome.candidates {
        lines.push(serde_json::to_string(&json!({ "candidate": record }))?);
    }
    lines.push(serde_json::to_string(&json!({ "final": outcome.final_metric }))?);
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paint_timing::FinalizeReason;

    const IMAGE_THEN_PARAGRAPH: &str = r#"{
        "events": [
            {"at": 0, "type": "insert", "parent": 0, "node": 1, "tag": "img"},
            {"at": 0, "type": "insert", "parent": 0, "node": 2, "tag": "p"},
            {"at": 20, "type": "intersect", "node": 2, "width": 30, "height": 10},
            {"at": 10, "type": "intersect", "node": 1, "width": 20, "height": 25}
        ]
    }"#;

    #[test]
    fn events_replay_in_time_order() -> Result<()> {
        let outcome = replay(parse(IMAGE_THEN_PARAGRAPH)?, &Overrides::default())?;
        let sizes: Vec<f64> = outcome.candidates.iter().map(|record| record.size).collect();
        assert_eq!(sizes, vec![500.0]);
        let metric = outcome.final_metric.unwrap();
        assert_eq!(metric.reason, FinalizeReason::QuietPeriod);
        assert_eq!(metric.finalized_at_ms, 5010.0);
        Ok(())
    }

    #[test]
    fn quiet_override_and_short_until() -> Result<()> {
        let mut script = parse(IMAGE_THEN_PARAGRAPH)?;
        script.until = Some(100.0);
        let outcome = replay(
            script,
            &Overrides {
                quiet_ms: Some(1000),
                native: false,
            },
        )?;
        assert!(outcome.final_metric.is_none());
        let lines = render(&outcome)?;
        assert_eq!(lines.last().map(String::as_str), Some(r#"{"final":null}"#));
        Ok(())
    }

    #[test]
    fn native_scripts_use_recorded_entries() -> Result<()> {
        let script = parse(
            r#"{
                "native": true,
                "events": [
                    {"at": 5, "type": "native", "records": [
                        {"entryType": "largest-contentful-paint", "startTime": 4, "size": 90}
                    ]},
                    {"at": 50, "type": "input", "kind": "keydown"}
                ]
            }"#,
        )?;
        let outcome = replay(script, &Overrides::default())?;
        let metric = outcome.final_metric.unwrap();
        assert_eq!(metric.record.map(|record| record.size), Some(90.0));
        assert_eq!(metric.finalized_at_ms, 50.0);
        Ok(())
    }

    #[test]
    fn entries_below_the_threshold_are_not_candidates() -> Result<()> {
        let script = parse(
            r#"{
                "config": {"intersectionThreshold": 0.5},
                "events": [
                    {"at": 0, "type": "insert", "parent": 0, "node": 1, "tag": "img"},
                    {"at": 10, "type": "intersect", "node": 1, "width": 40, "height": 40, "ratio": 0.25},
                    {"at": 20, "type": "intersect", "node": 1, "width": 40, "height": 40, "ratio": 0.75}
                ]
            }"#,
        )?;
        let outcome = replay(script, &Overrides::default())?;
        let starts: Vec<f64> = outcome.candidates.iter().map(|record| record.start_time).collect();
        assert_eq!(starts, vec![20.0]);
        Ok(())
    }

    #[test]
    fn unknown_event_types_are_rejected() {
        assert!(parse(r#"{"events": [{"at": 0, "type": "scroll"}]}"#).is_err());
    }
}
