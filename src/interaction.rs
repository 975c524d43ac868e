//! Pointer and keyboard gestures on the canvas.
//!
//! The manager only remembers ids and points between events. Every scene
//! change goes through the [`StateManager`]; camera changes are reported back
//! in the [`Response`] so the engine can invalidate the right layers.

use iced::keyboard::{Key, Modifiers, key::Named};
use iced::mouse::Button;
use iced::{Point, Rectangle, Size};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::config::InteractionConfig;
use crate::error::GraphError;
use crate::link::{Link, LinkGeometryCache, LinkId};
use crate::node::{Node, NodeId, PortDirection, PortId};
use crate::render::grid::snap_to_grid;
use crate::render::link::PreviewState;
use crate::state::StateManager;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Connecting {
        node: NodeId,
        port: PortId,
        direction: PortDirection,
        cursor: Point,
        target: Option<(NodeId, PortId)>,
        preview: PreviewState,
    },
    DraggingNodes {
        grab: Point,
        origins: Vec<(NodeId, Point)>,
        moved: bool,
    },
    BoxSelecting {
        origin: Point,
        current: Point,
        additive: bool,
    },
    Panning {
        last: Point,
    },
}

impl Gesture {
    pub fn name(&self) -> &'static str {
        match self {
            Gesture::Idle => "idle",
            Gesture::Connecting { .. } => "connecting",
            Gesture::DraggingNodes { .. } => "dragging-nodes",
            Gesture::BoxSelecting { .. } => "box-selecting",
            Gesture::Panning { .. } => "panning",
        }
    }
}

/// What lies under a world point, topmost first.
#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    Port { node: NodeId, port: PortId },
    Node(NodeId),
    Link(LinkId),
    Empty,
}

/// The connection being dragged, for the preview renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionPreview {
    pub anchor: Point,
    pub cursor: Point,
    pub from_output: bool,
    pub state: PreviewState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct Response {
    /// The camera moved; everything needs redrawing.
    pub camera_changed: bool,
    /// Overlay-only change (preview, selection box, hover).
    pub needs_redraw: bool,
}

impl Response {
    fn redraw() -> Self {
        Self {
            camera_changed: false,
            needs_redraw: true,
        }
    }

    fn camera() -> Self {
        Self {
            camera_changed: true,
            needs_redraw: true,
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

pub struct InteractionManager {
    config: InteractionConfig,
    gesture: Gesture,
    hovered_node: Option<NodeId>,
    hovered_port: Option<(NodeId, PortId)>,
    hovered_link: Option<LinkId>,
    selected_link: Option<LinkId>,
    modifiers: Modifiers,
    last_click: Option<(NodeId, Instant)>,
    double_clicked: Option<NodeId>,
}

impl InteractionManager {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            gesture: Gesture::Idle,
            hovered_node: None,
            hovered_port: None,
            hovered_link: None,
            selected_link: None,
            modifiers: Modifiers::default(),
            last_click: None,
            double_clicked: None,
        }
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: InteractionConfig) {
        self.config = config;
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn is_idle(&self) -> bool {
        self.gesture == Gesture::Idle
    }

    pub fn hovered_node(&self) -> Option<&NodeId> {
        self.hovered_node.as_ref()
    }

    pub fn hovered_port(&self) -> Option<(&NodeId, &PortId)> {
        self.hovered_port.as_ref().map(|(n, p)| (n, p))
    }

    pub fn hovered_link(&self) -> Option<&LinkId> {
        self.hovered_link.as_ref()
    }

    pub fn selected_link(&self) -> Option<&LinkId> {
        self.selected_link.as_ref()
    }

    /// Node double-clicked since the last call, if any.
    pub fn take_double_click(&mut self) -> Option<NodeId> {
        self.double_clicked.take()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn set_modifiers(&mut self, modifiers: Modifiers) {
        self.modifiers = modifiers;
    }

    pub fn selected_nodes(&self, state: &StateManager) -> Vec<NodeId> {
        state
            .nodes()
            .filter(|n| n.selected)
            .map(|n| n.id().clone())
            .collect()
    }

    pub fn select_all(&mut self, state: &mut StateManager) {
        let all: HashSet<NodeId> = state.node_ids().iter().cloned().collect();
        state.set_selection(&all);
    }

    pub fn clear_selection(&mut self, state: &mut StateManager) {
        self.selected_link = None;
        state.set_selection(&HashSet::new());
    }

    pub fn preview(&self, state: &StateManager) -> Option<ConnectionPreview> {
        let Gesture::Connecting {
            node,
            port,
            direction,
            cursor,
            preview,
            ..
        } = &self.gesture
        else {
            return None;
        };
        Some(ConnectionPreview {
            anchor: state.port_position(node, port)?,
            cursor: *cursor,
            from_output: *direction == PortDirection::Output,
            state: *preview,
        })
    }

    /// World-space rubber band while box selecting.
    pub fn selection_rect(&self) -> Option<Rectangle> {
        match self.gesture {
            Gesture::BoxSelecting { origin, current, .. } => Some(normalized_rect(origin, current)),
            _ => None,
        }
    }

    /// Ports win over node bodies, node bodies over links. Later entities
    /// sit on top of earlier ones.
    pub fn hit_test(&self, state: &StateManager, geometry: &mut LinkGeometryCache, world: Point) -> Hit {
        for node in state.nodes().rev() {
            let radius = node.kind().traits().port_hit_radius;
            for port in node.ports() {
                if let Some(pos) = state.port_position(node.id(), &port.id)
                    && pos.distance(world) <= radius
                {
                    return Hit::Port {
                        node: node.id().clone(),
                        port: port.id.clone(),
                    };
                }
            }
        }
        if let Some(node) = state.nodes().rev().find(|n| n.contains_point(world)) {
            return Hit::Node(node.id().clone());
        }
        let threshold = self.config.link_hit_threshold;
        for link in state.links().rev() {
            if let Some((from, to)) = state.link_nodes(link)
                && geometry.get(link, from, to).contains_point(world, threshold)
            {
                return Hit::Link(link.id.clone());
            }
        }
        Hit::Empty
    }

    pub fn pointer_down(
        &mut self,
        state: &mut StateManager,
        camera: &Camera,
        geometry: &mut LinkGeometryCache,
        screen: Point,
        button: Button,
        modifiers: Modifiers,
    ) -> Response {
        self.modifiers = modifiers;
        if !self.is_idle() {
            return Response::none();
        }

        if matches!(button, Button::Middle | Button::Right) {
            self.begin(Gesture::Panning { last: screen });
            return Response::redraw();
        }
        if button != Button::Left {
            return Response::none();
        }

        let world = camera.to_world(screen);
        match self.hit_test(state, geometry, world) {
            Hit::Port { node, port } => {
                let Some(direction) = state
                    .node(&node)
                    .and_then(|n| n.port(&port))
                    .map(|p| p.direction)
                else {
                    return Response::none();
                };
                self.begin(Gesture::Connecting {
                    node,
                    port,
                    direction,
                    cursor: world,
                    target: None,
                    preview: PreviewState::Pending,
                });
                Response::redraw()
            }
            Hit::Node(id) => {
                self.selected_link = None;
                if self.is_double_click(&id) {
                    debug!(node = %id, "node double-clicked");
                    self.double_clicked = Some(id);
                    return Response::none();
                }
                self.press_node(state, id, world, modifiers.shift());
                Response::redraw()
            }
            Hit::Link(id) if modifiers.alt() => {
                match state.remove_link(&id) {
                    Ok(_) => debug!(link = %id, "deleted link"),
                    Err(err) => warn!(%err, "failed to delete link"),
                }
                self.hovered_link = None;
                if self.selected_link.as_ref() == Some(&id) {
                    self.selected_link = None;
                }
                Response::redraw()
            }
            Hit::Link(id) => {
                self.selected_link = Some(id);
                Response::redraw()
            }
            Hit::Empty => {
                self.selected_link = None;
                self.begin(Gesture::BoxSelecting {
                    origin: world,
                    current: world,
                    additive: modifiers.shift(),
                });
                Response::redraw()
            }
        }
    }

    /// A second press on the same node inside the double-click window.
    fn is_double_click(&mut self, id: &NodeId) -> bool {
        let now = Instant::now();
        let window = Duration::from_millis(self.config.double_click_ms);
        let double = self
            .last_click
            .take()
            .is_some_and(|(last, at)| &last == id && now.saturating_duration_since(at) < window);
        if !double {
            self.last_click = Some((id.clone(), now));
        }
        double
    }

    fn press_node(&mut self, state: &mut StateManager, id: NodeId, world: Point, shift: bool) {
        let mut selection: HashSet<NodeId> = self.selected_nodes(state).into_iter().collect();
        if shift {
            if !selection.remove(&id) {
                selection.insert(id.clone());
            }
        } else if !selection.contains(&id) {
            selection.clear();
            selection.insert(id.clone());
        }
        state.set_selection(&selection);

        if !selection.contains(&id) {
            return;
        }
        let origins = state
            .nodes()
            .filter(|n| n.selected)
            .map(|n| (n.id().clone(), n.position()))
            .collect();
        self.begin(Gesture::DraggingNodes {
            grab: world,
            origins,
            moved: false,
        });
    }

    pub fn pointer_move(
        &mut self,
        state: &mut StateManager,
        camera: &mut Camera,
        geometry: &mut LinkGeometryCache,
        screen: Point,
    ) -> Response {
        let world = camera.to_world(screen);
        match &mut self.gesture {
            Gesture::Idle => self.update_hover(state, geometry, world),
            Gesture::Panning { last } => {
                let (dx, dy) = (screen.x - last.x, screen.y - last.y);
                *last = screen;
                camera.pan(dx, dy);
                Response::camera()
            }
            Gesture::BoxSelecting { current, .. } => {
                *current = world;
                Response::redraw()
            }
            Gesture::DraggingNodes { grab, origins, moved } => {
                let (dx, dy) = (world.x - grab.x, world.y - grab.y);
                let snap = self.config.snap_to_grid.then_some(self.config.snap_size);
                let moves: Vec<(NodeId, Point)> = origins
                    .iter()
                    .map(|(id, origin)| {
                        let target = Point::new(origin.x + dx, origin.y + dy);
                        (id.clone(), snap.map_or(target, |size| snap_to_grid(target, size)))
                    })
                    .collect();
                *moved = true;
                if let Err(err) = state.move_nodes(&moves) {
                    warn!(%err, "node drag target vanished, cancelling");
                    return self.cancel(state);
                }
                Response::redraw()
            }
            Gesture::Connecting { .. } => {
                let (target, preview) = self.connection_target(state, world);
                if let Gesture::Connecting {
                    cursor,
                    target: current_target,
                    preview: current_preview,
                    ..
                } = &mut self.gesture
                {
                    *cursor = world;
                    *current_target = target;
                    *current_preview = preview;
                }
                Response::redraw()
            }
        }
    }

    pub fn pointer_up(
        &mut self,
        state: &mut StateManager,
        camera: &Camera,
        screen: Point,
        button: Button,
    ) -> Response {
        let world = camera.to_world(screen);
        if matches!(self.gesture, Gesture::Connecting { .. }) && button != Button::Left {
            // Another button released mid-drag; keep connecting.
            return Response::none();
        }
        let resolved = self.connection_target(state, world);

        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => Response::none(),
            Gesture::Panning { .. } => Response::redraw(),
            Gesture::DraggingNodes { moved, origins, .. } => {
                debug!(nodes = origins.len(), moved, "finished node drag");
                Response::redraw()
            }
            Gesture::BoxSelecting {
                origin, additive, ..
            } => {
                let rect = normalized_rect(origin, world);
                let mut selection: HashSet<NodeId> = if additive {
                    self.selected_nodes(state).into_iter().collect()
                } else {
                    HashSet::new()
                };
                selection.extend(
                    state
                        .nodes()
                        .filter(|n| rects_intersect(rect, n.bounds()))
                        .map(|n| n.id().clone()),
                );
                debug!(selected = selection.len(), "box selection");
                state.set_selection(&selection);
                Response::redraw()
            }
            Gesture::Connecting {
                node, port, direction, ..
            } => {
                if let (Some((to_node, to_port)), PreviewState::Valid) = resolved {
                    let link = oriented_link(&node, &port, direction, &to_node, &to_port);
                    match state.add_link(link) {
                        Ok(id) => debug!(link = %id, "connected"),
                        Err(err) => warn!(%err, "connection rejected"),
                    }
                } else {
                    debug!("connection discarded");
                }
                Response::redraw()
            }
        }
    }

    /// The pointer left the canvas.
    pub fn pointer_leave(&mut self, state: &mut StateManager) -> Response {
        let mut response = self.cancel(state);
        if self.hovered_node.take().is_some() {
            state.set_hovered(None);
            response.needs_redraw = true;
        }
        if self.hovered_port.take().is_some() || self.hovered_link.take().is_some() {
            response.needs_redraw = true;
        }
        response
    }

    /// Negative `delta` zooms in.
    pub fn wheel(&mut self, camera: &mut Camera, screen: Point, delta: f32) -> Response {
        if camera.zoom_to_point(delta, screen, self.config.wheel_sensitivity) {
            Response::camera()
        } else {
            Response::none()
        }
    }

    pub fn key_down(&mut self, state: &mut StateManager, key: &Key, modifiers: Modifiers) -> Response {
        self.modifiers = modifiers;
        match key.as_ref() {
            Key::Named(Named::Escape) => {
                if self.is_idle() {
                    self.clear_selection(state);
                    Response::redraw()
                } else {
                    self.cancel(state)
                }
            }
            Key::Named(Named::Delete | Named::Backspace) if self.is_idle() => {
                self.delete_selection(state);
                Response::redraw()
            }
            Key::Character("a" | "A") if modifiers.command() && self.is_idle() => {
                self.select_all(state);
                Response::redraw()
            }
            Key::Character("d" | "D") if modifiers.command() && self.is_idle() => {
                self.duplicate_selection(state);
                Response::redraw()
            }
            _ => Response::none(),
        }
    }

    /// Abandon the current gesture. A node drag snaps back to where it began.
    pub fn cancel(&mut self, state: &mut StateManager) -> Response {
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => Response::none(),
            Gesture::DraggingNodes { origins, moved, .. } => {
                if moved {
                    let live: Vec<(NodeId, Point)> = origins
                        .into_iter()
                        .filter(|(id, _)| state.contains_node(id))
                        .collect();
                    if let Err(err) = state.move_nodes(&live) {
                        warn!(%err, "failed to restore dragged nodes");
                    }
                }
                debug!("node drag cancelled");
                Response::redraw()
            }
            other => {
                debug!(gesture = other.name(), "gesture cancelled");
                Response::redraw()
            }
        }
    }

    /// Forget hovered or selected ids that no longer exist.
    pub fn prune(&mut self, state: &StateManager) {
        if self
            .hovered_node
            .as_ref()
            .is_some_and(|id| !state.contains_node(id))
        {
            self.hovered_node = None;
        }
        if self
            .hovered_port
            .as_ref()
            .is_some_and(|(id, _)| !state.contains_node(id))
        {
            self.hovered_port = None;
        }
        if self.hovered_link.as_ref().is_some_and(|id| state.link(id).is_none()) {
            self.hovered_link = None;
        }
        if self.selected_link.as_ref().is_some_and(|id| state.link(id).is_none()) {
            self.selected_link = None;
        }
        let stale = match &self.gesture {
            Gesture::Connecting { node, .. } => !state.contains_node(node),
            Gesture::DraggingNodes { origins, .. } => origins.iter().any(|(id, _)| !state.contains_node(id)),
            _ => false,
        };
        if stale {
            self.gesture = Gesture::Idle;
        }
    }

    pub fn reset(&mut self) {
        self.gesture = Gesture::Idle;
        self.hovered_node = None;
        self.hovered_port = None;
        self.hovered_link = None;
        self.selected_link = None;
        self.last_click = None;
        self.double_clicked = None;
    }

    fn begin(&mut self, gesture: Gesture) {
        debug!(gesture = gesture.name(), "gesture started");
        self.gesture = gesture;
    }

    /// Copy every selected node and select the copies instead. Returns the
    /// new ids in insertion order.
    pub fn duplicate_selection(&mut self, state: &mut StateManager) -> Vec<NodeId> {
        let copies: Vec<Node> = state
            .nodes()
            .filter(|n| n.selected)
            .map(|n| n.duplicate(NodeId::generate(n.kind())))
            .collect();
        let mut created = Vec::with_capacity(copies.len());
        for copy in copies {
            let id = copy.id().clone();
            match state.add_node(copy) {
                Ok(()) => created.push(id),
                Err(err) => warn!(%err, "failed to duplicate node"),
            }
        }
        if !created.is_empty() {
            debug!(count = created.len(), "duplicated selection");
            self.selected_link = None;
            state.set_selection(&created.iter().cloned().collect());
        }
        created
    }

    fn delete_selection(&mut self, state: &mut StateManager) {
        for id in self.selected_nodes(state) {
            if let Err(err) = state.remove_node(&id) {
                warn!(%err, "failed to delete node");
            }
        }
        if let Some(link) = self.selected_link.take()
            && state.link(&link).is_some()
            && let Err(err) = state.remove_link(&link)
        {
            warn!(%err, "failed to delete link");
        }
        self.prune(state);
    }

    fn update_hover(&mut self, state: &mut StateManager, geometry: &mut LinkGeometryCache, world: Point) -> Response {
        let hit = self.hit_test(state, geometry, world);
        let (node, port, link) = match hit {
            Hit::Port { node, port } => (Some(node.clone()), Some((node, port)), None),
            Hit::Node(node) => (Some(node), None, None),
            Hit::Link(link) => (None, None, Some(link)),
            Hit::Empty => (None, None, None),
        };

        let changed = node != self.hovered_node || port != self.hovered_port || link != self.hovered_link;
        if node != self.hovered_node {
            state.set_hovered(node.as_ref());
        }
        self.hovered_node = node;
        self.hovered_port = port;
        self.hovered_link = link;
        if changed { Response::redraw() } else { Response::none() }
    }

    /// Port a connection dragged to `world` would land on, and whether the
    /// resulting link would be accepted.
    fn connection_target(&self, state: &StateManager, world: Point) -> (Option<(NodeId, PortId)>, PreviewState) {
        let Gesture::Connecting {
            node, port, direction, ..
        } = &self.gesture
        else {
            return (None, PreviewState::Pending);
        };
        let wanted = direction.opposite();

        let Some(target) = nearest_port(state, world, wanted, self.config.snap_threshold)
            .or_else(|| body_port(state, world, wanted))
        else {
            return (None, PreviewState::Pending);
        };

        let link = oriented_link(node, port, *direction, &target.0, &target.1);
        let preview = match check_connection(state, &link) {
            Ok(()) => PreviewState::Valid,
            Err(err) => {
                debug!(%err, "connection target rejected");
                PreviewState::Invalid
            }
        };
        (Some(target), preview)
    }
}

/// Rules a drag-created connection must satisfy on top of the graph
/// invariants: no self-connection and at most one link per input.
pub fn check_connection(state: &StateManager, link: &Link) -> Result<(), GraphError> {
    if link.from_node_id == link.to_node_id {
        return Err(GraphError::SelfConnection(link.from_node_id.clone()));
    }
    if !state.port_links(&link.to_node_id, &link.to_port_id).is_empty() {
        return Err(GraphError::InputAlreadyConnected {
            node: link.to_node_id.clone(),
            port: link.to_port_id.clone(),
        });
    }
    state.validate_link(link)
}

fn oriented_link(
    node: &NodeId,
    port: &PortId,
    direction: PortDirection,
    other_node: &NodeId,
    other_port: &PortId,
) -> Link {
    match direction {
        PortDirection::Output => Link::new(node.clone(), port.clone(), other_node.clone(), other_port.clone()),
        PortDirection::Input => Link::new(other_node.clone(), other_port.clone(), node.clone(), port.clone()),
    }
}

fn nearest_port(
    state: &StateManager,
    world: Point,
    direction: PortDirection,
    threshold: f32,
) -> Option<(NodeId, PortId)> {
    state
        .nodes()
        .flat_map(|node| {
            node.ports_in(direction).iter().filter_map(move |port| {
                let pos = state.port_position(node.id(), &port.id)?;
                let reach = threshold.max(node.kind().traits().port_hit_radius);
                let d = pos.distance(world);
                (d <= reach).then(|| (d, node.id().clone(), port.id.clone()))
            })
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, node, port)| (node, port))
}

/// Dropping on a node body picks its first port of the needed direction.
fn body_port(state: &StateManager, world: Point, direction: PortDirection) -> Option<(NodeId, PortId)> {
    let node: &Node = state.nodes().rev().find(|n| n.contains_point(world))?;
    let port = node.ports_in(direction).first()?;
    Some((node.id().clone(), port.id.clone()))
}

fn normalized_rect(a: Point, b: Point) -> Rectangle {
    Rectangle::new(
        Point::new(a.x.min(b.x), a.y.min(b.y)),
        Size::new((a.x - b.x).abs(), (a.y - b.y).abs()),
    )
}

fn rects_intersect(a: Rectangle, b: Rectangle) -> bool {
    a.x <= b.x + b.width && b.x <= a.x + a.width && a.y <= b.y + b.height && b.y <= a.y + a.height
}
