use iced::{Point, Rectangle, Size};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;

pub const DEFAULT_NODE_WIDTH: f32 = 200.0;
pub const DEFAULT_NODE_HEIGHT: f32 = 150.0;
pub const DEFAULT_NODE_COLOR: &str = "#3b82f6";

/// Click radius around a port anchor, in world units.
pub const PORT_HIT_RADIUS: f32 = 15.0;
/// Circular nodes get a larger port target; their connectors sit on the ring.
pub const CIRCULAR_PORT_HIT_RADIUS: f32 = 25.0;

pub const SMART_MATRIX_HIT_RADIUS: f32 = 110.0;
/// Ring radius on which radial ports are placed.
pub const RADIAL_PORT_RADIUS: f32 = 85.0;
/// World offset of a duplicate from its original, on both axes.
pub const DUPLICATE_OFFSET: f32 = 50.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh `<kind>-<uuid>` identifier.
    pub fn generate(kind: NodeKind) -> Self {
        Self(format!("{}-{}", kind.as_str(), uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Port identifier, unique only within its node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    SmartMatrix,
    Trigger,
    DataSource,
    Filter,
    Transform,
    Condition,
    Loop,
    Output,
    Webhook,
    Schedule,
    ApiCall,
    Test,
}

impl NodeKind {
    pub const ALL: [NodeKind; 12] = [
        NodeKind::SmartMatrix,
        NodeKind::Trigger,
        NodeKind::DataSource,
        NodeKind::Filter,
        NodeKind::Transform,
        NodeKind::Condition,
        NodeKind::Loop,
        NodeKind::Output,
        NodeKind::Webhook,
        NodeKind::Schedule,
        NodeKind::ApiCall,
        NodeKind::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::SmartMatrix => "smart-matrix",
            NodeKind::Trigger => "trigger",
            NodeKind::DataSource => "data-source",
            NodeKind::Filter => "filter",
            NodeKind::Transform => "transform",
            NodeKind::Condition => "condition",
            NodeKind::Loop => "loop",
            NodeKind::Output => "output",
            NodeKind::Webhook => "webhook",
            NodeKind::Schedule => "schedule",
            NodeKind::ApiCall => "api-call",
            NodeKind::Test => "test",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn traits(&self) -> &'static KindTraits {
        match self {
            NodeKind::SmartMatrix => &SMART_MATRIX_TRAITS,
            NodeKind::Test => &TEST_TRAITS,
            _ => &GENERIC_TRAITS,
        }
    }

    fn default_size(&self) -> Size {
        match self {
            NodeKind::SmartMatrix => Size::new(250.0, 250.0),
            _ => Size::new(DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT),
        }
    }

    fn default_label(&self) -> &'static str {
        match self {
            NodeKind::SmartMatrix => "Smart Matrix",
            NodeKind::Test => "Test Node",
            other => other.as_str(),
        }
    }

    fn default_color(&self) -> &'static str {
        match self {
            NodeKind::SmartMatrix => "#8b5cf6",
            _ => DEFAULT_NODE_COLOR,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind behaviour table. Rendering has its own table in `render::node`.
pub struct KindTraits {
    pub contains: fn(&Node, Point) -> bool,
    /// Anchor of port `index` out of `count` on one side, optionally aimed at
    /// the centre of a connected peer.
    pub port_anchor: fn(&Node, PortDirection, usize, usize, Option<Point>) -> Point,
    pub port_hit_radius: f32,
    pub circular: bool,
}

static GENERIC_TRAITS: KindTraits = KindTraits {
    contains: contains_rect,
    port_anchor: linear_anchor,
    port_hit_radius: PORT_HIT_RADIUS,
    circular: false,
};

static SMART_MATRIX_TRAITS: KindTraits = KindTraits {
    contains: contains_circle,
    port_anchor: radial_anchor,
    port_hit_radius: CIRCULAR_PORT_HIT_RADIUS,
    circular: true,
};

static TEST_TRAITS: KindTraits = KindTraits {
    contains: contains_rect,
    port_anchor: radial_anchor,
    port_hit_radius: CIRCULAR_PORT_HIT_RADIUS,
    circular: true,
};

fn contains_rect(node: &Node, p: Point) -> bool {
    p.x >= node.position.x
        && p.x <= node.position.x + node.size.width
        && p.y >= node.position.y
        && p.y <= node.position.y + node.size.height
}

fn contains_circle(node: &Node, p: Point) -> bool {
    node.center().distance(p) <= SMART_MATRIX_HIT_RADIUS
}

fn linear_anchor(
    node: &Node,
    direction: PortDirection,
    index: usize,
    count: usize,
    _peer: Option<Point>,
) -> Point {
    let spacing = node.size.height / (count as f32 + 1.0);
    let x = match direction {
        PortDirection::Input => node.position.x,
        PortDirection::Output => node.position.x + node.size.width,
    };
    Point::new(x, node.position.y + spacing * (index as f32 + 1.0))
}

fn radial_anchor(
    node: &Node,
    direction: PortDirection,
    index: usize,
    count: usize,
    peer: Option<Point>,
) -> Point {
    let center = node.center();
    let angle = match peer {
        Some(peer) if peer != center => (peer.y - center.y).atan2(peer.x - center.x),
        _ => {
            let base = match direction {
                PortDirection::Input => PI,
                PortDirection::Output => 0.0,
            };
            // Fan unconnected ports around the default side.
            let step = PI / 8.0;
            base + step * (index as f32 - (count as f32 - 1.0) / 2.0)
        }
    };
    Point::new(
        center.x + RADIAL_PORT_RADIUS * angle.cos(),
        center.y + RADIAL_PORT_RADIUS * angle.sin(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Event,
    Stream,
    Any,
}

impl DataType {
    pub fn is_compatible(self, other: DataType) -> bool {
        self == other || self == DataType::Any || other == DataType::Any
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Event => "event",
            DataType::Stream => "stream",
            DataType::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn opposite(self) -> Self {
        match self {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: PortId,
    #[serde(rename = "type")]
    pub direction: PortDirection,
    pub data_type: DataType,
    pub label: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    pub label: String,
    pub color: String,
    position: Point,
    size: Size,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    pub status: NodeStatus,
    pub selected: bool,
    pub hovered: bool,
    pub error_message: Option<String>,
    execution_count: u32,
    last_execution_ms: Option<u64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    geometry_version: u64,
}

impl Node {
    /// Builds a node with the kind's default size, label, colour and ports.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, position: Point) -> Self {
        let mut node = Self {
            id: id.into(),
            kind,
            label: kind.default_label().to_string(),
            color: kind.default_color().to_string(),
            position,
            size: kind.default_size(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            status: NodeStatus::Idle,
            selected: false,
            hovered: false,
            error_message: None,
            execution_count: 0,
            last_execution_ms: None,
            metadata: serde_json::Map::new(),
            geometry_version: 0,
        };
        match kind {
            NodeKind::SmartMatrix => {
                node.add_output("output", DataType::Any, "Output");
            }
            NodeKind::Test => {
                node.add_input("input1", DataType::String, "Input 1", false);
                node.add_input("input2", DataType::Number, "Input 2", false);
                node.add_output("output", DataType::String, "Output");
            }
            _ => {}
        }
        node
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_input(mut self, id: &str, data_type: DataType, label: &str, required: bool) -> Self {
        self.add_input(id, data_type, label, required);
        self
    }

    pub fn with_output(mut self, id: &str, data_type: DataType, label: &str) -> Self {
        self.add_output(id, data_type, label);
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Bumped on every position, size or port-set change.
    pub fn geometry_version(&self) -> u64 {
        self.geometry_version
    }

    pub fn set_position(&mut self, position: Point) -> bool {
        if position == self.position {
            return false;
        }
        self.position = position;
        self.geometry_version += 1;
        true
    }

    pub fn set_size(&mut self, size: Size) -> bool {
        if size == self.size {
            return false;
        }
        self.size = size;
        self.geometry_version += 1;
        true
    }

    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(self.position, self.size)
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.position.x + self.size.width / 2.0,
            self.position.y + self.size.height / 2.0,
        )
    }

    pub fn has_finite_geometry(&self) -> bool {
        self.position.x.is_finite()
            && self.position.y.is_finite()
            && self.size.width.is_finite()
            && self.size.height.is_finite()
    }

    pub fn contains_point(&self, p: Point) -> bool {
        (self.kind.traits().contains)(self, p)
    }

    /// Adding a port with an existing id replaces it in place.
    pub fn add_input(&mut self, id: &str, data_type: DataType, label: &str, required: bool) {
        let port = Port {
            id: PortId::new(id),
            direction: PortDirection::Input,
            data_type,
            label: label.to_string(),
            connected: false,
            required,
        };
        upsert_port(&mut self.inputs, port);
        self.geometry_version += 1;
    }

    pub fn add_output(&mut self, id: &str, data_type: DataType, label: &str) {
        let port = Port {
            id: PortId::new(id),
            direction: PortDirection::Output,
            data_type,
            label: label.to_string(),
            connected: false,
            required: false,
        };
        upsert_port(&mut self.outputs, port);
        self.geometry_version += 1;
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn ports_in(&self, direction: PortDirection) -> &[Port] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    pub fn port(&self, id: &PortId) -> Option<&Port> {
        self.ports().find(|p| &p.id == id)
    }

    pub fn set_port_connected(&mut self, id: &PortId, connected: bool) {
        if let Some(port) = self
            .inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .find(|p| &p.id == id)
        {
            port.connected = connected;
        }
    }

    /// World position of a port, aimed at `peer` for radial layouts.
    pub fn port_position(&self, id: &PortId, peer: Option<Point>) -> Option<Point> {
        let port = self.port(id)?;
        let ports = self.ports_in(port.direction);
        let index = ports.iter().position(|p| &p.id == id)?;
        Some((self.kind.traits().port_anchor)(
            self,
            port.direction,
            index,
            ports.len(),
            peer,
        ))
    }

    /// Problems that would stop this node from running.
    pub fn validate(&self) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|p| p.required && !p.connected)
            .map(|p| format!("Required input port \"{}\" is not connected", p.label))
            .collect()
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    pub fn last_execution_ms(&self) -> Option<u64> {
        self.last_execution_ms
    }

    pub fn mark_running(&mut self) {
        self.status = NodeStatus::Running;
        self.error_message = None;
    }

    pub fn mark_success(&mut self, finished_at_ms: u64) {
        self.status = NodeStatus::Success;
        self.execution_count += 1;
        self.last_execution_ms = Some(finished_at_ms);
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = NodeStatus::Error;
        self.error_message = Some(message.into());
    }

    pub fn to_data(&self) -> NodeData {
        NodeData {
            id: self.id.clone(),
            kind: self.kind,
            label: self.label.clone(),
            x: Some(self.position.x),
            y: Some(self.position.y),
            width: self.size.width,
            height: self.size.height,
            color: self.color.clone(),
            status: self.status,
            ports: NodePorts {
                inputs: self.inputs.clone(),
                outputs: self.outputs.clone(),
            },
            metadata: NodeMetadata {
                execution_count: self.execution_count,
                last_execution_time: self.last_execution_ms,
                error: self.error_message.clone(),
                extra: self.metadata.clone(),
            },
        }
    }

    /// Copy under a new id, offset from the original. Run history, status,
    /// selection and connection flags start fresh.
    pub fn duplicate(&self, id: NodeId) -> Node {
        let mut data = self.to_data();
        data.id = id;
        data.x = Some(self.position.x + DUPLICATE_OFFSET);
        data.y = Some(self.position.y + DUPLICATE_OFFSET);
        data.status = NodeStatus::Idle;
        data.metadata.execution_count = 0;
        data.metadata.last_execution_time = None;
        data.metadata.error = None;
        Node::from_data(data)
    }

    /// Kind-keyed factory: starts from the kind defaults, then applies the
    /// stored fields. Connection flags are cleared; links re-establish them.
    pub fn from_data(data: NodeData) -> Self {
        let position = Point::new(data.x.unwrap_or_default(), data.y.unwrap_or_default());
        let mut node = Node::new(data.id, data.kind, position)
            .with_label(data.label)
            .with_color(data.color)
            .with_size(Size::new(data.width, data.height));
        node.status = data.status;
        if !data.ports.inputs.is_empty() || !data.ports.outputs.is_empty() {
            node.inputs = data.ports.inputs;
            node.outputs = data.ports.outputs;
        }
        for port in node.inputs.iter_mut().chain(node.outputs.iter_mut()) {
            port.connected = false;
        }
        node.execution_count = data.metadata.execution_count;
        node.last_execution_ms = data.metadata.last_execution_time;
        node.error_message = data.metadata.error;
        node.metadata = data.metadata.extra;
        node
    }
}

fn upsert_port(ports: &mut Vec<Port>, port: Port) {
    match ports.iter_mut().find(|p| p.id == port.id) {
        Some(existing) => *existing = port,
        None => ports.push(port),
    }
}

/// Serialised form of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    /// Missing coordinates leave placement to the loader.
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    pub width: f32,
    pub height: f32,
    pub color: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub ports: NodePorts,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePorts {
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default)]
    pub execution_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_ports_are_spread_along_edges() {
        let node = Node::new("g", NodeKind::Filter, Point::new(10.0, 20.0))
            .with_input("a", DataType::Any, "A", false)
            .with_input("b", DataType::Any, "B", false)
            .with_output("out", DataType::Any, "Out");
        let a = node.port_position(&"a".into(), None).unwrap();
        let b = node.port_position(&"b".into(), None).unwrap();
        let out = node.port_position(&"out".into(), None).unwrap();
        assert_eq!(a, Point::new(10.0, 20.0 + 50.0));
        assert_eq!(b, Point::new(10.0, 20.0 + 100.0));
        assert_eq!(out, Point::new(210.0, 20.0 + 75.0));
    }

    #[test]
    fn radial_port_points_at_peer() {
        let node = Node::new("t", NodeKind::Test, Point::ORIGIN);
        let center = node.center();
        let peer = Point::new(center.x, center.y + 500.0);
        let p = node.port_position(&"output".into(), Some(peer)).unwrap();
        assert!((p.x - center.x).abs() < 1e-3);
        assert!((p.y - (center.y + RADIAL_PORT_RADIUS)).abs() < 1e-3);
    }

    #[test]
    fn smart_matrix_hit_test_is_circular() {
        let node = Node::new("m", NodeKind::SmartMatrix, Point::ORIGIN);
        assert!(node.contains_point(Point::new(125.0, 125.0)));
        // Bounding-box corner lies outside the circle.
        assert!(!node.contains_point(Point::new(2.0, 2.0)));
    }

    #[test]
    fn geometry_version_bumps_only_on_change() {
        let mut node = Node::new("n", NodeKind::Filter, Point::ORIGIN);
        let base = node.geometry_version();
        assert!(!node.set_position(Point::ORIGIN));
        assert_eq!(node.geometry_version(), base);
        assert!(node.set_position(Point::new(1.0, 0.0)));
        assert!(node.set_size(Size::new(10.0, 10.0)));
        assert_eq!(node.geometry_version(), base + 2);
    }

    #[test]
    fn validate_reports_required_inputs() {
        let node = Node::new("n", NodeKind::Filter, Point::ORIGIN).with_input(
            "in",
            DataType::Any,
            "Source",
            true,
        );
        assert_eq!(node.validate().len(), 1);
    }

    #[test]
    fn data_uses_wire_field_names() {
        let node = Node::new("n1", NodeKind::DataSource, Point::new(1.0, 2.0));
        let json = serde_json::to_value(node.to_data()).unwrap();
        assert_eq!(json["type"], "data-source");
        assert_eq!(json["label"], "data-source");
        for key in ["id", "x", "y", "width", "height", "color", "status", "ports", "metadata"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn duplicates_are_offset_and_reset() {
        let mut node = Node::new("n", NodeKind::Filter, Point::new(10.0, 20.0))
            .with_label("Drop Nulls")
            .with_output("out", DataType::Any, "Out");
        node.set_port_connected(&"out".into(), true);
        node.selected = true;
        node.mark_error("boom");

        let copy = node.duplicate(NodeId::generate(NodeKind::Filter));
        assert!(copy.id().as_str().starts_with("filter-"));
        assert_eq!(copy.position(), Point::new(60.0, 70.0));
        assert_eq!(copy.label, "Drop Nulls");
        assert_eq!(copy.status, NodeStatus::Idle);
        assert!(copy.error_message.is_none());
        assert!(!copy.selected);
        assert!(!copy.outputs()[0].connected);
    }
}
