use iced::Point;
use std::cell::RefCell;
use std::rc::Rc;

use nodeflow::error::GraphError;
use nodeflow::link::{Link, LinkId};
use nodeflow::node::{DataType, Node, NodeId, NodeKind, PortId};
use nodeflow::state::{StateEvent, StateManager};

fn node(id: &str, x: f32) -> Node {
    Node::new(id, NodeKind::Transform, Point::new(x, 0.0))
        .with_input("in", DataType::Number, "In", false)
        .with_output("out", DataType::Number, "Out")
}

fn chain(ids: &[&str]) -> StateManager {
    let mut state = StateManager::new();
    for (i, id) in ids.iter().enumerate() {
        state.add_node(node(id, i as f32 * 300.0)).unwrap();
    }
    for pair in ids.windows(2) {
        state.add_link(Link::new(pair[0], "out", pair[1], "in")).unwrap();
    }
    state
}

#[test]
fn link_validation_reports_the_first_failure() {
    let mut state = chain(&["a", "b"]);
    state
        .add_node(Node::new("s", NodeKind::DataSource, Point::ORIGIN).with_output("text", DataType::String, "Text"))
        .unwrap();

    assert_eq!(
        state.add_link(Link::new("ghost", "out", "a", "in")),
        Err(GraphError::NodeNotFound(NodeId::new("ghost")))
    );
    assert!(matches!(
        state.add_link(Link::new("a", "nope", "b", "in")),
        Err(GraphError::PortNotFound { .. })
    ));
    assert!(matches!(
        state.add_link(Link::new("a", "in", "b", "in")),
        Err(GraphError::WrongDirection { expected: "output", .. })
    ));
    assert_eq!(
        state.add_link(Link::new("s", "text", "b", "in")),
        Err(GraphError::TypeMismatch {
            source_type: DataType::String,
            target_type: DataType::Number,
        })
    );
    assert!(matches!(
        state.add_link(Link::new("b", "out", "a", "in")),
        Err(GraphError::WouldCreateCycle { .. })
    ));
    assert_eq!(state.link_count(), 1);
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut state = chain(&["a", "b"]);
    assert_eq!(state.add_node(node("a", 0.0)), Err(GraphError::DuplicateNode(NodeId::new("a"))));

    let id = state.links().next().unwrap().id.clone();
    let again = Link::new("a", "out", "b", "in").with_id(id.clone());
    assert_eq!(state.add_link(again), Err(GraphError::DuplicateLink(id)));
}

#[test]
fn removing_a_node_cascades_to_its_links() {
    let mut state = chain(&["a", "b", "c"]);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    state.subscribe(move |event| sink.borrow_mut().push(event.name()));

    state.remove_node(&NodeId::new("b")).unwrap();

    assert_eq!(state.link_count(), 0);
    assert!(!state.node(&NodeId::new("a")).unwrap().port(&PortId::new("out")).unwrap().connected);
    assert_eq!(
        *events.borrow(),
        vec!["linkRemoved", "linkRemoved", "nodeRemoved", "stateChanged"]
    );
}

#[test]
fn removing_the_only_link_frees_both_ports() {
    let mut state = chain(&["a", "b"]);
    let id: LinkId = state.links().next().unwrap().id.clone();
    assert!(state.node(&NodeId::new("b")).unwrap().port(&PortId::new("in")).unwrap().connected);

    state.remove_link(&id).unwrap();
    assert!(!state.node(&NodeId::new("b")).unwrap().port(&PortId::new("in")).unwrap().connected);
    assert_eq!(state.remove_link(&id), Err(GraphError::LinkNotFound(id)));
}

#[test]
fn outputs_may_fan_out() {
    let mut state = chain(&["a", "b"]);
    state.add_node(node("c", 600.0)).unwrap();
    state.add_link(Link::new("a", "out", "c", "in")).unwrap();
    assert_eq!(state.output_links(&NodeId::new("a")).len(), 2);
    assert_eq!(state.port_links(&NodeId::new("a"), &PortId::new("out")).len(), 2);
}

#[test]
fn every_mutation_bumps_the_revision() {
    let mut state = StateManager::new();
    let start = state.revision();
    state.add_node(node("a", 0.0)).unwrap();
    state.move_node(&NodeId::new("a"), Point::new(5.0, 5.0)).unwrap();
    // No-op move
    state.move_node(&NodeId::new("a"), Point::new(5.0, 5.0)).unwrap();
    assert_eq!(state.revision(), start + 2);
    assert!(state.is_dirty());
    state.mark_clean();
    assert!(!state.stats().dirty);
}

#[test]
fn failed_mutations_emit_nothing() {
    let mut state = chain(&["a", "b"]);
    let events = Rc::new(RefCell::new(Vec::<StateEvent>::new()));
    let sink = events.clone();
    state.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    let _ = state.add_link(Link::new("b", "out", "a", "in"));
    let _ = state.remove_node(&NodeId::new("ghost"));
    assert!(events.borrow().is_empty());
}

#[test]
fn back_link_between_two_nodes_is_a_cycle() {
    let mut state = StateManager::new();
    state
        .add_node(
            Node::new("A", NodeKind::Filter, Point::ORIGIN)
                .with_input("in_fallback", DataType::Any, "In", false)
                .with_output("out", DataType::Any, "Out"),
        )
        .unwrap();
    state
        .add_node(
            Node::new("B", NodeKind::Filter, Point::new(300.0, 0.0))
                .with_input("in", DataType::Any, "In", false)
                .with_output("out_fallback", DataType::Any, "Out"),
        )
        .unwrap();

    state.add_link(Link::new("A", "out", "B", "in")).unwrap();
    assert!(matches!(
        state.add_link(Link::new("B", "out_fallback", "A", "in_fallback")),
        Err(GraphError::WouldCreateCycle { .. })
    ));
    assert_eq!(state.link_count(), 1);
}

#[test]
fn rectangular_nodes_contain_their_closed_bounds() {
    let node = Node::new("r", NodeKind::Filter, Point::new(10.0, 20.0));
    let size = node.size();
    for (x, y, inside) in [
        (10.0, 20.0, true),
        (10.0 + size.width, 20.0 + size.height, true),
        (60.0, 90.0, true),
        (9.9, 50.0, false),
        (50.0, 20.0 + size.height + 0.1, false),
    ] {
        assert_eq!(node.contains_point(Point::new(x, y)), inside, "({x}, {y})");
    }
}

#[test]
fn port_ids_must_be_unique_across_directions() {
    let mut state = StateManager::new();
    let twin = Node::new("t", NodeKind::Transform, Point::ORIGIN)
        .with_input("p", DataType::Any, "In", false)
        .with_output("p", DataType::Any, "Out");
    assert_eq!(
        state.add_node(twin),
        Err(GraphError::DuplicatePort {
            node: NodeId::new("t"),
            port: PortId::new("p")
        })
    );

    let mut state = chain(&["a", "b"]);
    let revision = state.revision();
    let result = state.update_node(&NodeId::new("a"), |n| n.add_output("in", DataType::Number, "Echo"));
    assert!(matches!(result, Err(GraphError::DuplicatePort { .. })));
    assert_eq!(state.node(&NodeId::new("a")).unwrap().outputs().len(), 1);
    assert_eq!(state.revision(), revision);
}

#[test]
fn node_edits_may_not_break_attached_links() {
    let mut state = chain(&["a", "b"]);
    let b = NodeId::new("b");

    let retyped = state.update_node(&b, |n| n.add_input("in", DataType::String, "In", false));
    assert!(matches!(retyped, Err(GraphError::TypeMismatch { .. })));
    let port = state.node(&b).unwrap().port(&PortId::new("in")).unwrap();
    assert_eq!(port.data_type, DataType::Number);

    let dropped = state.update_node(&b, |n| *n = node("b", 300.0).with_label("bare"));
    assert!(dropped.is_ok());
    let stripped = state.update_node(&b, |n| *n = Node::new("b", NodeKind::Transform, n.position()));
    assert!(matches!(stripped, Err(GraphError::PortNotFound { .. })));
    assert_eq!(state.link_count(), 1);
}

#[test]
fn replaced_ports_keep_their_connection_flag() {
    let mut state = chain(&["a", "b"]);
    let b = NodeId::new("b");
    state
        .update_node(&b, |n| n.add_input("in", DataType::Any, "Renamed", true))
        .unwrap();
    let port = state.node(&b).unwrap().port(&PortId::new("in")).unwrap().clone();
    assert_eq!(port.label, "Renamed");
    assert!(port.connected);
}

#[test]
fn port_lookups_follow_link_removal() {
    let mut state = chain(&["a", "b", "c"]);
    let (a, out) = (NodeId::new("a"), PortId::new("out"));
    assert_eq!(state.port_links(&a, &out).len(), 1);

    let id = state.port_links(&a, &out)[0].id.clone();
    state.remove_link(&id).unwrap();
    assert!(state.port_links(&a, &out).is_empty());
    assert!(state.port_links(&NodeId::new("b"), &PortId::new("in")).is_empty());
    assert_eq!(state.port_links(&NodeId::new("b"), &PortId::new("out")).len(), 1);
    assert_eq!(state.port_position(&a, &out), Some(Point::new(200.0, 75.0)));
}
