use core::cell::RefCell;
use std::rc::Rc;

use dom::{DOMUpdate, NodeKey};
use paint_timing::host::manual::Capabilities;
use paint_timing::host::Rect;
use paint_timing::{CandidateRecord, CandidateTracker, ManualHost, MetricsConfig};

mod common;

fn tracker_at(host: &Rc<ManualHost>, root: NodeKey) -> (CandidateTracker, Rc<RefCell<Vec<CandidateRecord>>>) {
    common::init_logging();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let tracker = CandidateTracker::new(common::as_host(host), root, &MetricsConfig::default(), move |record| {
        sink.borrow_mut().push(record.clone());
    });
    (tracker, seen)
}

#[test]
fn emissions_strictly_increase_over_arbitrary_sequences() {
    let host = ManualHost::new();
    let (tracker, seen) = tracker_at(&host, NodeKey::ROOT);

    // Linear congruential sequence so the run is reproducible.
    let mut state: u64 = 0x2545_F491;
    let mut expected = Vec::new();
    let mut largest = 0.0;
    for node in 0..500_u64 {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        let width = (state >> 33) % 400;
        let height = (state >> 17) % 300;
        let intersecting = state % 5 != 0;
        let rect = Rect::sized(width as f64, height as f64);
        let before = tracker.largest_area();
        host.advance_by(1.0);
        let entry = if intersecting {
            common::visible(node, rect.width, rect.height)
        } else {
            common::hidden(node, rect.width, rect.height)
        };
        tracker.on_visibility_change(&[entry]);
        assert!(tracker.largest_area() >= before, "largest area went backwards");
        if intersecting && rect.area() > largest {
            largest = rect.area();
            expected.push(largest);
        }
    }

    let sizes: Vec<f64> = seen.borrow().iter().map(|record| record.size).collect();
    assert_eq!(sizes, expected);
    assert!(sizes.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(tracker.emissions(), expected.len() as u64);
}

#[test]
fn records_carry_detection_time_and_element() {
    let host = ManualHost::new();
    let (tracker, seen) = tracker_at(&host, NodeKey::ROOT);
    assert!(tracker.observe());
    host.insert_element(NodeKey::ROOT, NodeKey(7), "IMG");
    host.advance_to(42.0);
    host.show(NodeKey(7), Rect::new(5.0, 5.0, 30.0, 20.0));

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].entry_type, "largest-contentful-paint");
    assert_eq!(seen[0].start_time, 42.0);
    assert_eq!(seen[0].size, 600.0);
    assert_eq!(seen[0].duration, 0.0);
    assert_eq!(seen[0].name, "");
    assert_eq!(seen[0].element, Some(NodeKey(7)));
}

#[test]
fn non_candidate_tags_never_emit() {
    let host = ManualHost::new();
    let (tracker, seen) = tracker_at(&host, NodeKey::ROOT);
    assert!(tracker.observe());
    host.apply(&[
        DOMUpdate::element(NodeKey::ROOT, NodeKey(1), "div"),
        DOMUpdate::element(NodeKey::ROOT, NodeKey(2), "span"),
        DOMUpdate::InsertText {
            parent: NodeKey(2),
            node: NodeKey(3),
            text: "hello".into(),
            pos: 0,
        },
    ]);
    host.show(NodeKey(1), Rect::sized(1000.0, 1000.0));
    host.show(NodeKey(2), Rect::sized(1000.0, 1000.0));
    assert!(seen.borrow().is_empty());
    assert!(tracker.observed_targets().is_empty());
}

#[test]
fn nested_insertions_are_tracked() {
    let host = ManualHost::new();
    let (tracker, seen) = tracker_at(&host, NodeKey::ROOT);
    assert!(tracker.observe());
    host.insert_element(NodeKey::ROOT, NodeKey(1), "main");
    host.insert_element(NodeKey(1), NodeKey(2), "section");
    host.insert_element(NodeKey(2), NodeKey(3), "video");
    host.show(NodeKey(3), Rect::sized(640.0, 360.0));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn insertions_outside_the_root_are_ignored() {
    let host = ManualHost::new();
    host.apply(&[
        DOMUpdate::element(NodeKey::ROOT, NodeKey(10), "article"),
        DOMUpdate::element(NodeKey::ROOT, NodeKey(20), "aside"),
    ]);
    let (tracker, seen) = tracker_at(&host, NodeKey(10));
    assert!(tracker.observe());
    host.insert_element(NodeKey(20), NodeKey(21), "img");
    host.insert_element(NodeKey(10), NodeKey(11), "img");
    assert_eq!(tracker.observed_targets(), vec![NodeKey(11)]);
    host.show(NodeKey(21), Rect::sized(500.0, 500.0));
    assert!(seen.borrow().is_empty());
    host.show(NodeKey(11), Rect::sized(10.0, 10.0));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn leaving_the_viewport_does_not_retract() {
    let host = ManualHost::new();
    let (tracker, seen) = tracker_at(&host, NodeKey::ROOT);
    assert!(tracker.observe());
    host.insert_element(NodeKey::ROOT, NodeKey(1), "p");
    host.show(NodeKey(1), Rect::sized(50.0, 10.0));
    host.hide(NodeKey(1), Rect::sized(50.0, 10.0));
    host.remove_node(NodeKey(1));
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(tracker.largest_area(), 500.0);
}

#[test]
fn disconnect_before_any_emission_silences_everything() {
    let host = ManualHost::new();
    let (tracker, seen) = tracker_at(&host, NodeKey::ROOT);
    assert!(tracker.observe());
    tracker.disconnect();
    tracker.disconnect();
    assert!(!tracker.observe());

    host.insert_element(NodeKey::ROOT, NodeKey(1), "img");
    host.show(NodeKey(1), Rect::sized(100.0, 100.0));
    tracker.on_visibility_change(&[common::visible(1, 100.0, 100.0)]);
    assert!(seen.borrow().is_empty());
    assert!(host.activity().is_idle());
}

#[test]
fn hosts_without_observers_leave_the_tracker_inert() {
    let host = ManualHost::with_capabilities(Capabilities {
        intersection_observer: false,
        ..Capabilities::default()
    });
    let (tracker, _seen) = tracker_at(&host, NodeKey::ROOT);
    assert!(!tracker.observe());
    assert!(!tracker.is_observing());
    assert!(host.activity().is_idle());
}
