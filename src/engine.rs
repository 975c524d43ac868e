//! Frame-driven canvas engine.
//!
//! The engine owns every component and three draw-list layers. State changes
//! reach it through a state-manager subscription that only flips dirty
//! flags; the next [`CanvasEngine::tick`] redraws whatever is dirty.

use iced::keyboard::{Key, Modifiers};
use iced::mouse::Button;
use iced::{Color, Point, Rectangle};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::config::{EngineConfig, GridKind};
use crate::error::EngineError;
use crate::events::{EventBus, SubscriptionId};
use crate::interaction::{InteractionManager, Response};
use crate::layout;
use crate::link::{Link, LinkGeometryCache, LinkStatus};
use crate::node::{NodeId, NodeStatus};
use crate::perf::PerformanceTracker;
use crate::render::grid::GridRenderer;
use crate::render::link::{LinkHighlight, LinkRenderer};
use crate::render::node::{NodeRenderCtx, NodeRenderer, RenderStats};
use crate::render::text_cache::TextCache;
use crate::render::{DrawList, StrokeStyle, Surface, TextRun, palette};
use crate::scene::{NodeMatcher, Scene};
use crate::state::{LoadReport, StateEvent, StateManager};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    LinkAdded(Link),
    LinkRemoved(Link),
    NodeDoubleClicked(NodeId),
    /// Every state manager event, forwarded as is.
    State(StateEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    LinkAdded,
    LinkRemoved,
    NodeDoubleClicked,
    State,
}

impl EngineEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEventKind::LinkAdded => "link-added",
            EngineEventKind::LinkRemoved => "link-removed",
            EngineEventKind::NodeDoubleClicked => "node-double-clicked",
            EngineEventKind::State => "state",
        }
    }
}

impl EngineEvent {
    pub fn kind(&self) -> EngineEventKind {
        match self {
            EngineEvent::LinkAdded(_) => EngineEventKind::LinkAdded,
            EngineEvent::LinkRemoved(_) => EngineEventKind::LinkRemoved,
            EngineEvent::NodeDoubleClicked(_) => EngineEventKind::NodeDoubleClicked,
            EngineEvent::State(_) => EngineEventKind::State,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Background,
    Connections,
    Nodes,
}

/// One drawing layer: recorded commands plus its backing size in physical
/// pixels. `generation` bumps on every redraw so hosts can tell when to
/// re-upload.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    list: DrawList,
    physical_width: u32,
    physical_height: u32,
    generation: u64,
}

impl Layer {
    pub fn commands(&self) -> &DrawList {
        &self.list
    }

    pub fn physical_size(&self) -> (u32, u32) {
        (self.physical_width, self.physical_height)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Dirty {
    background: bool,
    foreground: bool,
}

impl Dirty {
    const ALL: Dirty = Dirty {
        background: true,
        foreground: true,
    };
}

/// Text cache entries to drop before the next node pass.
#[derive(Debug, Default)]
struct Evictions {
    nodes: Vec<NodeId>,
    all: bool,
}

const DEBUG_PANEL: Rectangle = Rectangle {
    x: 10.0,
    y: 10.0,
    width: 200.0,
    height: 120.0,
};
const DEBUG_TEXT: Color = Color::from_rgb(0.0, 1.0, 0.0);
const DEBUG_FONT_SIZE: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineMetrics {
    pub fps: f32,
    /// Average over the sample window, in milliseconds.
    pub frame_time: f32,
    pub node_count: usize,
    pub link_count: usize,
}

/// What a call to [`CanvasEngine::tick`] actually redrew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub background: bool,
    pub foreground: bool,
    pub nodes: RenderStats,
}

impl FrameReport {
    pub fn redrew(&self) -> bool {
        self.background || self.foreground
    }
}

pub struct CanvasEngine {
    config: EngineConfig,
    camera: Camera,
    state: StateManager,
    interaction: InteractionManager,
    grid: GridRenderer,
    node_renderer: NodeRenderer,
    link_renderer: LinkRenderer,
    geometry: LinkGeometryCache,
    text: TextCache,
    perf: PerformanceTracker,
    background: Layer,
    connections: Layer,
    nodes: Layer,
    dirty: Rc<Cell<Dirty>>,
    evictions: Rc<RefCell<Evictions>>,
    events: Rc<RefCell<EventBus<EngineEvent>>>,
    state_subscription: Option<SubscriptionId>,
    running: bool,
    visible: bool,
    destroyed: bool,
    debug: bool,
    started_at: Option<Instant>,
    last_drift_check: Option<Instant>,
}

impl CanvasEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let camera = Camera::new(config.camera)?;
        let grid = GridRenderer::new(config.grid.clone())?;
        let link_renderer = LinkRenderer::new(config.links.clone())?;

        let mut engine = Self {
            camera,
            state: StateManager::new(),
            interaction: InteractionManager::new(config.interaction.clone()),
            grid,
            node_renderer: NodeRenderer::new(config.cull_padding),
            link_renderer,
            geometry: LinkGeometryCache::new(),
            text: TextCache::new(config.text_cache_capacity),
            perf: PerformanceTracker::default(),
            background: Layer::default(),
            connections: Layer::default(),
            nodes: Layer::default(),
            dirty: Rc::new(Cell::new(Dirty::ALL)),
            evictions: Rc::new(RefCell::new(Evictions::default())),
            events: Rc::new(RefCell::new(EventBus::new())),
            state_subscription: None,
            running: false,
            visible: true,
            destroyed: false,
            debug: config.debug,
            started_at: None,
            last_drift_check: None,
            config,
        };
        engine.state_subscription = Some(engine.forward_state_events());
        info!("canvas engine created");
        Ok(engine)
    }

    /// State changes only mark the foreground dirty, queue text cache
    /// evictions and are re-published on the engine's own bus.
    fn forward_state_events(&mut self) -> SubscriptionId {
        let dirty = Rc::clone(&self.dirty);
        let evictions = Rc::clone(&self.evictions);
        let bus = Rc::clone(&self.events);
        self.state.subscribe(move |event| {
            let mut flags = dirty.get();
            flags.foreground = true;
            dirty.set(flags);

            match event {
                StateEvent::NodeRemoved(id) => evictions.borrow_mut().nodes.push(id.clone()),
                StateEvent::Cleared => {
                    let mut evictions = evictions.borrow_mut();
                    evictions.nodes.clear();
                    evictions.all = true;
                }
                _ => {}
            }

            let Ok(mut bus) = bus.try_borrow_mut() else {
                warn!(event = event.name(), "engine event emitted re-entrantly, dropping");
                return;
            };
            match event {
                StateEvent::LinkAdded(link) => bus.emit(&EngineEvent::LinkAdded(link.clone())),
                StateEvent::LinkRemoved(link) => bus.emit(&EngineEvent::LinkRemoved(link.clone())),
                _ => {}
            }
            bus.emit(&EngineEvent::State(event.clone()));
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Lifecycle

    pub fn start(&mut self) {
        if self.destroyed || self.running {
            return;
        }
        self.running = true;
        self.mark_all_dirty();
        debug!("engine started");
    }

    pub fn stop(&mut self) {
        self.running = false;
        debug!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Hidden engines skip drawing. Becoming visible again forces one full
    /// redraw on the next tick.
    pub fn set_visible(&mut self, visible: bool) {
        if visible && !self.visible {
            self.mark_all_dirty();
        }
        self.visible = visible;
    }

    /// Release subscriptions, layers and caches. Every later command is a
    /// no-op or returns [`EngineError::Destroyed`].
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(id) = self.state_subscription.take() {
            self.state.unsubscribe(id);
        }
        self.events.borrow_mut().clear();
        self.running = false;
        self.destroyed = true;
        self.background = Layer::default();
        self.connections = Layer::default();
        self.nodes = Layer::default();
        self.geometry.clear();
        self.text.clear();
        self.perf.reset();
        self.interaction.reset();
        info!("canvas engine destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug
    }

    /// Toggle the frame statistics panel in the top left corner.
    pub fn set_debug_mode(&mut self, enabled: bool) {
        if self.debug != enabled {
            self.debug = enabled;
            self.config.debug = enabled;
            self.mark_foreground_dirty();
            debug!(enabled, "debug overlay toggled");
        }
    }

    // Frame loop

    pub fn tick(&mut self, now: Instant) -> FrameReport {
        if self.destroyed || !self.running {
            return FrameReport::default();
        }
        let started = *self.started_at.get_or_insert(now);
        let time = now.saturating_duration_since(started).as_secs_f32();

        self.check_drift(now);

        if !self.visible {
            return FrameReport::default();
        }
        if self.is_animating() || self.debug {
            self.mark_foreground_dirty();
        }

        let dirty = self.dirty.replace(Dirty::default());
        if !dirty.background && !dirty.foreground {
            return FrameReport::default();
        }

        let frame_start = Instant::now();
        let mut report = FrameReport::default();
        if dirty.background {
            self.render_background();
            report.background = true;
        }
        if dirty.foreground {
            self.render_connections(time);
            report.nodes = self.render_nodes(time);
            report.foreground = true;
        }
        let frame_ms = frame_start.elapsed().as_secs_f32() * 1000.0;
        self.perf.record(frame_ms, now);
        report
    }

    /// Whether something on screen moves on its own.
    pub fn is_animating(&self) -> bool {
        self.state.links().any(|l| l.status == LinkStatus::Active)
            || self.state.nodes().any(|n| n.status == NodeStatus::Running)
    }

    pub fn needs_redraw(&self) -> bool {
        let dirty = self.dirty.get();
        dirty.background || dirty.foreground || self.debug || self.is_animating()
    }

    fn check_drift(&mut self, now: Instant) {
        let interval = Duration::from_millis(self.config.drift_check_ms);
        let due = self
            .last_drift_check
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);
        if due {
            self.last_drift_check = Some(now);
            if self.camera.sanitize() {
                self.mark_all_dirty();
            }
        }
    }

    fn render_background(&mut self) {
        self.background.list.clear();
        self.grid.render(&mut self.background.list, &self.camera);
        self.background.generation += 1;
    }

    fn render_connections(&mut self, time: f32) {
        let Self {
            state,
            camera,
            geometry,
            link_renderer,
            interaction,
            connections,
            ..
        } = self;

        connections.list.clear();
        geometry.retain(|id| state.link(id).is_some());

        for link in state.links() {
            let Some((from, to)) = state.link_nodes(link) else {
                warn!(link = %link.id, "link endpoint missing, skipping");
                continue;
            };
            let curve = geometry.get(link, from, to);
            if !curve.is_finite() {
                warn!(link = %link.id, "link geometry is not finite, skipping");
                continue;
            }
            let highlight = LinkHighlight {
                hovered: interaction.hovered_link() == Some(&link.id),
                selected: interaction.selected_link() == Some(&link.id),
            };
            link_renderer.render(&mut connections.list, camera, link, curve, highlight, time);
        }

        if let Some(preview) = interaction.preview(state) {
            link_renderer.render_preview(
                &mut connections.list,
                camera,
                preview.anchor,
                preview.cursor,
                preview.from_output,
                preview.state,
            );
        }
        connections.generation += 1;
    }

    fn render_nodes(&mut self, time: f32) -> RenderStats {
        self.flush_text_evictions();
        let Self {
            state,
            camera,
            text,
            node_renderer,
            interaction,
            nodes,
            ..
        } = self;

        nodes.list.clear();
        let mut ctx = NodeRenderCtx {
            camera,
            state,
            text,
            hovered_port: interaction.hovered_port(),
            time,
        };
        let stats = node_renderer.render_all(&mut ctx, &mut nodes.list);

        if let Some(rect) = interaction.selection_rect() {
            let min = camera.to_screen(Point::new(rect.x, rect.y));
            let max = camera.to_screen(Point::new(rect.x + rect.width, rect.y + rect.height));
            let screen = Rectangle {
                x: min.x,
                y: min.y,
                width: max.x - min.x,
                height: max.y - min.y,
            };
            nodes.list.fill_rect(screen, palette::SELECTION_FILL);
            nodes
                .list
                .stroke_rounded_rect(screen, 0.0, StrokeStyle::new(palette::SELECTION_BORDER, 1.0));
        }
        if self.debug {
            let metrics = self.metrics();
            draw_debug_overlay(&mut self.nodes.list, &metrics, self.camera.zoom());
        }
        self.nodes.generation += 1;
        stats
    }

    fn flush_text_evictions(&mut self) {
        let Evictions { nodes, all } = std::mem::take(&mut *self.evictions.borrow_mut());
        if all {
            self.text.clear();
        }
        for id in &nodes {
            self.text.invalidate_node(id);
        }
    }

    fn mark_all_dirty(&self) {
        self.dirty.set(Dirty::ALL);
    }

    fn mark_foreground_dirty(&self) {
        let mut flags = self.dirty.get();
        flags.foreground = true;
        self.dirty.set(flags);
    }

    fn apply(&mut self, response: Response) {
        if response.camera_changed {
            self.mark_all_dirty();
        } else if response.needs_redraw {
            self.mark_foreground_dirty();
        }
        self.interaction.prune(&self.state);
    }

    pub fn force_redraw(&mut self) {
        self.mark_all_dirty();
    }

    // Host input

    pub fn resize(&mut self, width: f32, height: f32, device_pixel_ratio: f32) {
        self.camera.set_canvas_size(width, height);
        self.camera.set_device_pixel_ratio(device_pixel_ratio);
        let size = self.camera.canvas_size();
        let ratio = self.camera.device_pixel_ratio();
        let physical_width = (size.width * ratio).round() as u32;
        let physical_height = (size.height * ratio).round() as u32;
        for layer in [&mut self.background, &mut self.connections, &mut self.nodes] {
            layer.physical_width = physical_width;
            layer.physical_height = physical_height;
        }
        debug!(width, height, ratio, "resized");
        self.mark_all_dirty();
    }

    pub fn pointer_down(&mut self, screen: Point, button: Button, modifiers: Modifiers) {
        if self.destroyed {
            return;
        }
        let response = self.interaction.pointer_down(
            &mut self.state,
            &self.camera,
            &mut self.geometry,
            screen,
            button,
            modifiers,
        );
        self.apply(response);
        if let Some(id) = self.interaction.take_double_click() {
            self.emit(EngineEvent::NodeDoubleClicked(id));
        }
    }

    pub fn pointer_move(&mut self, screen: Point) {
        if self.destroyed {
            return;
        }
        let response =
            self.interaction
                .pointer_move(&mut self.state, &mut self.camera, &mut self.geometry, screen);
        self.apply(response);
    }

    pub fn pointer_up(&mut self, screen: Point, button: Button) {
        if self.destroyed {
            return;
        }
        let response = self
            .interaction
            .pointer_up(&mut self.state, &self.camera, screen, button);
        self.apply(response);
    }

    pub fn pointer_leave(&mut self) {
        if self.destroyed {
            return;
        }
        let response = self.interaction.pointer_leave(&mut self.state);
        self.apply(response);
    }

    pub fn wheel(&mut self, screen: Point, delta: f32) {
        if self.destroyed {
            return;
        }
        let response = self.interaction.wheel(&mut self.camera, screen, delta);
        self.apply(response);
    }

    pub fn key_down(&mut self, key: &Key, modifiers: Modifiers) {
        if self.destroyed {
            return;
        }
        let response = self.interaction.key_down(&mut self.state, key, modifiers);
        self.apply(response);
    }

    pub fn modifiers_changed(&mut self, modifiers: Modifiers) {
        self.interaction.set_modifiers(modifiers);
    }

    // Commands

    pub fn grid_kind(&self) -> GridKind {
        self.grid.kind()
    }

    pub fn set_grid_kind(&mut self, kind: GridKind) {
        self.grid.set_kind(kind);
        self.config.grid.kind = kind;
        let mut flags = self.dirty.get();
        flags.background = true;
        self.dirty.set(flags);
    }

    pub fn grid_color(&self) -> &str {
        self.grid.color()
    }

    pub fn set_grid_color(&mut self, hex: &str) -> Result<(), EngineError> {
        self.grid.set_color(hex)?;
        self.config.grid.color = hex.to_string();
        let mut flags = self.dirty.get();
        flags.background = true;
        self.dirty.set(flags);
        Ok(())
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera access; both layers are redrawn on the next tick.
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.mark_all_dirty();
        &mut self.camera
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Mutations made through this handle mark the engine dirty on their own.
    pub fn state_mut(&mut self) -> &mut StateManager {
        &mut self.state
    }

    pub fn interaction(&self) -> &InteractionManager {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut InteractionManager {
        self.mark_foreground_dirty();
        &mut self.interaction
    }

    pub fn layer(&self, kind: LayerKind) -> &Layer {
        match kind {
            LayerKind::Background => &self.background,
            LayerKind::Connections => &self.connections,
            LayerKind::Nodes => &self.nodes,
        }
    }

    pub fn subscribe(
        &mut self,
        kind: EngineEventKind,
        mut listener: impl FnMut(&EngineEvent) + 'static,
    ) -> Result<SubscriptionId, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        let id = self.events.borrow_mut().subscribe(move |event| {
            if event.kind() == kind {
                listener(event);
            }
        });
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.borrow_mut().unsubscribe(id)
    }

    fn emit(&self, event: EngineEvent) {
        match self.events.try_borrow_mut() {
            Ok(mut bus) => bus.emit(&event),
            Err(_) => warn!(event = event.kind().name(), "engine event emitted re-entrantly, dropping"),
        }
    }

    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            fps: self.perf.fps(),
            frame_time: self.perf.average(),
            node_count: self.state.node_count(),
            link_count: self.state.link_count(),
        }
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.perf
    }

    pub fn geometry_cache(&self) -> &LinkGeometryCache {
        &self.geometry
    }

    pub fn text_cache(&self) -> &TextCache {
        &self.text
    }

    // Scenes

    /// Current graph plus camera, ready to serialise.
    pub fn snapshot(&self) -> Scene {
        Scene {
            camera: Some(self.camera.state()),
            ..self.state.snapshot()
        }
    }

    pub fn load_scene(&mut self, scene: Scene) -> Result<LoadReport, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        if let Some(camera) = scene.camera {
            self.camera.set_state(camera)?;
        }
        self.interaction.reset();
        self.geometry.clear();
        self.text.clear();
        let report = self.state.load_scene(scene);
        if !report.rejected.is_empty() {
            warn!(rejected = report.rejected.len(), "scene loaded with rejected entries");
        }
        info!(
            nodes = report.nodes_loaded,
            links = report.links_loaded,
            "scene loaded"
        );
        self.mark_all_dirty();
        Ok(report)
    }

    /// Centre and zoom the camera on all nodes.
    pub fn fit_to_content(&mut self, padding: f32) {
        let bounds = self.state.nodes().map(|n| n.bounds()).reduce(|a, b| {
            let x = a.x.min(b.x);
            let y = a.y.min(b.y);
            Rectangle {
                x,
                y,
                width: (a.x + a.width).max(b.x + b.width) - x,
                height: (a.y + a.height).max(b.y + b.height) - y,
            }
        });
        if let Some(bounds) = bounds {
            self.camera.fit_bounds(bounds, padding);
            self.mark_all_dirty();
        }
    }

    pub fn auto_layout(&mut self) -> Result<usize, EngineError> {
        Ok(layout::arrange(&mut self.state)?)
    }

    /// Copy the selected nodes; the copies become the selection.
    pub fn duplicate_selection(&mut self) -> Vec<NodeId> {
        if self.destroyed {
            return Vec::new();
        }
        let created = self.interaction.duplicate_selection(&mut self.state);
        self.mark_foreground_dirty();
        created
    }

    pub fn clear_selection(&mut self) {
        self.interaction.clear_selection(&mut self.state);
    }

    /// Replace the selection with every node the matcher accepts.
    pub fn select_matching(&mut self, matcher: &NodeMatcher) -> usize {
        let found: HashSet<NodeId> = self
            .state
            .search(matcher)
            .into_iter()
            .map(|n| n.id().clone())
            .collect();
        debug!(count = found.len(), "selected matching nodes");
        self.interaction.clear_selection(&mut self.state);
        self.state.set_selection(&found);
        found.len()
    }
}

fn draw_debug_overlay(list: &mut DrawList, metrics: &EngineMetrics, zoom: f32) {
    list.fill_rect(DEBUG_PANEL, Color::from_rgba(0.0, 0.0, 0.0, 0.7));
    let lines = [
        format!("FPS: {:.0}", metrics.fps),
        format!("Frame: {:.2}ms", metrics.frame_time),
        format!("Nodes: {}", metrics.node_count),
        format!("Links: {}", metrics.link_count),
        format!("Zoom: {:.0}%", zoom * 100.0),
    ];
    for (i, content) in lines.into_iter().enumerate() {
        list.fill_text(TextRun {
            content,
            position: Point::new(DEBUG_PANEL.x + 10.0, DEBUG_PANEL.y + 20.0 * (i as f32 + 1.0)),
            size: DEBUG_FONT_SIZE,
            color: DEBUG_TEXT,
        });
    }
}

impl Drop for CanvasEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_grid_size() {
        let mut config = EngineConfig::default();
        config.grid.size = -1.0;
        assert!(matches!(CanvasEngine::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn idle_ticks_do_not_redraw() {
        let mut engine = CanvasEngine::new(EngineConfig::default()).unwrap();
        engine.resize(400.0, 300.0, 2.0);
        engine.start();
        let now = Instant::now();
        assert!(engine.tick(now).redrew());
        assert!(!engine.tick(now + Duration::from_millis(16)).redrew());
        assert_eq!(engine.layer(LayerKind::Background).physical_size(), (800, 600));
    }
}
