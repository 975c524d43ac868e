use iced::Point;
use tracing::debug;

use crate::error::GraphError;
use crate::node::{Node, NodeId};
use crate::state::StateManager;

const ROW_SPACING: f32 = 200.0;
const INITIAL_Y: f32 = 50.0;
const MAX_ROWS: usize = 200;
/// Clear space kept around a candidate slot.
const GAP: f32 = 30.0;

// Column positions for different node roles
const SOURCE_X: f32 = 50.0; // Left - output only nodes
const PROCESSOR_X: f32 = 400.0; // Middle - nodes with both
const SINK_X: f32 = 750.0; // Right - input only nodes

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Source,    // Only outputs
    Sink,      // Only inputs
    Processor, // Both inputs and outputs
    Unknown,   // No ports yet
}

impl NodeRole {
    pub fn of(node: &Node) -> Self {
        let has_inputs = !node.inputs().is_empty();
        let has_outputs = !node.outputs().is_empty();

        match (has_inputs, has_outputs) {
            (false, true) => NodeRole::Source,
            (true, false) => NodeRole::Sink,
            (true, true) => NodeRole::Processor,
            (false, false) => NodeRole::Unknown,
        }
    }

    pub fn column_x(&self) -> f32 {
        match self {
            NodeRole::Source => SOURCE_X,
            NodeRole::Sink => SINK_X,
            NodeRole::Processor | NodeRole::Unknown => PROCESSOR_X,
        }
    }
}

/// First free slot in the node's column, ignoring the node itself.
pub fn auto_position(state: &StateManager, node: &Node) -> Point {
    find_free_position(state, node, NodeRole::of(node).column_x())
}

/// Re-place every node into its role column, top to bottom in insertion
/// order. Returns how many nodes moved.
pub fn arrange(state: &mut StateManager) -> Result<usize, GraphError> {
    let mut next_y = [INITIAL_Y; 3];
    let moves: Vec<(NodeId, Point)> = state
        .nodes()
        .map(|node| {
            let column = match NodeRole::of(node) {
                NodeRole::Source => 0,
                NodeRole::Processor | NodeRole::Unknown => 1,
                NodeRole::Sink => 2,
            };
            let target = Point::new(NodeRole::of(node).column_x(), next_y[column]);
            next_y[column] += node.size().height.max(ROW_SPACING - GAP) + GAP;
            (node.id().clone(), target)
        })
        .collect();
    let moved = state.move_nodes(&moves)?;
    debug!(moved, "auto layout");
    Ok(moved)
}

fn find_free_position(state: &StateManager, node: &Node, base_x: f32) -> Point {
    let size = node.size();
    for row in 0..MAX_ROWS {
        let candidate = Point::new(base_x, INITIAL_Y + row as f32 * ROW_SPACING);

        let overlaps = state.nodes().filter(|other| other.id() != node.id()).any(|other| {
            let b = other.bounds();
            candidate.x < b.x + b.width + GAP
                && b.x < candidate.x + size.width + GAP
                && candidate.y < b.y + b.height + GAP
                && b.y < candidate.y + size.height + GAP
        });

        if !overlaps {
            return candidate;
        }
    }

    Point::new(base_x, INITIAL_Y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataType, NodeKind};

    #[test]
    fn roles_pick_columns() {
        let source = Node::new("s", NodeKind::Trigger, Point::ORIGIN).with_output("o", DataType::Event, "Out");
        let sink = Node::new("k", NodeKind::Output, Point::ORIGIN).with_input("i", DataType::Any, "In", false);
        assert_eq!(NodeRole::of(&source), NodeRole::Source);
        assert_eq!(NodeRole::of(&sink), NodeRole::Sink);
        assert!(NodeRole::of(&source).column_x() < NodeRole::of(&sink).column_x());
    }

    #[test]
    fn skips_occupied_slots() {
        let mut state = StateManager::new();
        let first = Node::new("a", NodeKind::Filter, Point::new(PROCESSOR_X, INITIAL_Y));
        state.add_node(first).unwrap();

        let second = Node::new("b", NodeKind::Filter, Point::ORIGIN);
        let pos = auto_position(&state, &second);
        assert_eq!(pos, Point::new(PROCESSOR_X, INITIAL_Y + ROW_SPACING));
    }

    #[test]
    fn arrange_stacks_columns() {
        let mut state = StateManager::new();
        for id in ["a", "b"] {
            let node = Node::new(id, NodeKind::Transform, Point::new(-500.0, -500.0))
                .with_input("i", DataType::Any, "In", false)
                .with_output("o", DataType::Any, "Out");
            state.add_node(node).unwrap();
        }
        assert_eq!(arrange(&mut state).unwrap(), 2);
        let ys: Vec<f32> = state.nodes().map(|n| n.position().y).collect();
        assert_eq!(ys, vec![INITIAL_Y, INITIAL_Y + ROW_SPACING]);
    }
}
