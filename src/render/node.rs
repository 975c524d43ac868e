use iced::{Color, Point, Rectangle, Size};
use std::f32::consts::PI;
use tracing::warn;

use super::kinds;
use super::text_cache::{TextCache, TextSlot};
use super::{DrawList, StrokeStyle, Surface, TextRun, palette, with_alpha};
use crate::camera::Camera;
use crate::config::color_or;
use crate::node::{Node, NodeId, NodeKind, NodeStatus, Port, PortDirection, PortId};
use crate::state::StateManager;

pub const NODE_HEADER_HEIGHT: f32 = 28.0;
pub const NODE_CORNER_RADIUS: f32 = 8.0;
pub const PORT_RADIUS: f32 = 6.0;
pub const LABEL_SIZE: f32 = 13.0;
pub const PORT_LABEL_SIZE: f32 = 10.0;
/// Port labels are unreadable below this zoom and are skipped.
pub const PORT_LABEL_MIN_ZOOM: f32 = 0.6;
const STATUS_RADIUS: f32 = 6.0;

/// Everything a kind renderer may read while drawing one node.
pub struct NodeRenderCtx<'a> {
    pub camera: &'a Camera,
    pub state: &'a StateManager,
    pub text: &'a mut TextCache,
    pub hovered_port: Option<(&'a NodeId, &'a PortId)>,
    /// Seconds since the engine started, for animated indicators.
    pub time: f32,
}

impl NodeRenderCtx<'_> {
    pub(super) fn port_screen_position(&self, node: &Node, port: &Port) -> Option<Point> {
        self.state
            .port_position(node.id(), &port.id)
            .map(|p| self.camera.to_screen(p))
    }

    pub(super) fn is_port_hovered(&self, node: &Node, port: &Port) -> bool {
        self.hovered_port
            .is_some_and(|(n, p)| n == node.id() && p == &port.id)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn text_run(
        &mut self,
        node: &Node,
        slot: TextSlot,
        text: &str,
        size: f32,
        max_width: f32,
        color: Color,
        anchor: TextAnchor,
    ) -> TextRun {
        let layout = self.text.layout(
            node.id(),
            slot,
            text,
            size,
            max_width,
            color,
            self.camera.device_pixel_ratio(),
        );
        let position = match anchor {
            TextAnchor::TopLeft(p) => p,
            TextAnchor::TopRight(p) => Point::new(p.x - layout.width, p.y),
            TextAnchor::Center(p) => Point::new(p.x - layout.width / 2.0, p.y - layout.height / 2.0),
        };
        TextRun {
            content: layout.content,
            position,
            size,
            color,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) enum TextAnchor {
    TopLeft(Point),
    TopRight(Point),
    Center(Point),
}

pub type KindRenderer = fn(&mut NodeRenderCtx<'_>, &Node, &mut dyn Surface);

pub fn renderer_for(kind: NodeKind) -> KindRenderer {
    match kind {
        NodeKind::SmartMatrix => kinds::render_smart_matrix,
        NodeKind::Test => kinds::render_test,
        _ => render_generic,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub drawn: usize,
    pub culled: usize,
    pub skipped: usize,
}

pub struct NodeRenderer {
    cull_padding: f32,
}

impl NodeRenderer {
    pub fn new(cull_padding: f32) -> Self {
        Self {
            cull_padding: cull_padding.max(0.0),
        }
    }

    pub fn is_visible(&self, node: &Node, camera: &Camera) -> bool {
        let bounds = node.bounds();
        let pad = self.cull_padding;
        camera.is_rect_visible(Rectangle {
            x: bounds.x - pad,
            y: bounds.y - pad,
            width: bounds.width + pad * 2.0,
            height: bounds.height + pad * 2.0,
        })
    }

    /// Draw every visible node, selected ones last so they sit on top.
    ///
    /// A node that fails to produce finite geometry is rolled back out of
    /// `list` and skipped; the others still render.
    pub fn render_all(&self, ctx: &mut NodeRenderCtx<'_>, list: &mut DrawList) -> RenderStats {
        let mut stats = RenderStats::default();
        let state = ctx.state;
        let ordered = state
            .nodes()
            .filter(|n| !n.selected)
            .chain(state.nodes().filter(|n| n.selected));

        for node in ordered {
            if !node.has_finite_geometry() {
                warn!(node = %node.id(), "skipping node with non-finite geometry");
                stats.skipped += 1;
                continue;
            }
            if !self.is_visible(node, ctx.camera) {
                stats.culled += 1;
                continue;
            }
            let mark = list.len();
            renderer_for(node.kind())(ctx, node, list);
            if list.is_finite_since(mark) {
                stats.drawn += 1;
            } else {
                warn!(node = %node.id(), "node produced non-finite draw commands, skipping");
                list.truncate(mark);
                stats.skipped += 1;
            }
        }
        stats
    }
}

/// Border colour and width for the node's current state.
pub(super) fn border_style(node: &Node, zoom: f32) -> StrokeStyle {
    let (color, width) = if node.status == NodeStatus::Error {
        (palette::NODE_BORDER_ERROR, 2.0)
    } else if node.selected {
        (palette::NODE_BORDER_SELECTED, 2.0)
    } else if node.hovered {
        (palette::NODE_BORDER_HOVER, 1.5)
    } else {
        (palette::NODE_BORDER, 1.0)
    };
    StrokeStyle::new(color, (width * zoom).max(1.0))
}

fn render_generic(ctx: &mut NodeRenderCtx<'_>, node: &Node, surface: &mut dyn Surface) {
    let zoom = ctx.camera.zoom();
    let origin = ctx.camera.to_screen(node.position());
    let size = Size::new(node.size().width * zoom, node.size().height * zoom);
    let rect = Rectangle::new(origin, size);
    let radius = NODE_CORNER_RADIUS * zoom;
    let header = NODE_HEADER_HEIGHT * zoom;
    let accent = color_or(&node.color, palette::NODE_BORDER);

    // Shadow
    surface.fill_rounded_rect(
        Rectangle {
            x: rect.x - 1.0,
            y: rect.y + 1.0,
            width: rect.width + 2.0,
            height: rect.height + 2.0,
        },
        radius + 1.0,
        palette::SHADOW,
    );
    surface.fill_rounded_rect(rect, radius, palette::NODE_BG);

    // Header: rounded on top, squared off where it meets the body.
    surface.fill_rounded_rect(Rectangle::new(origin, Size::new(size.width, header)), radius, palette::NODE_HEADER);
    surface.fill_rect(
        Rectangle {
            x: rect.x,
            y: rect.y + header / 2.0,
            width: rect.width,
            height: header / 2.0,
        },
        palette::NODE_HEADER,
    );
    surface.stroke_line(
        Point::new(rect.x, rect.y + header),
        Point::new(rect.x + rect.width, rect.y + header),
        StrokeStyle::new(accent, (2.0 * zoom).max(1.0)),
    );
    surface.stroke_rounded_rect(rect, radius, border_style(node, zoom));

    let label = ctx.text_run(
        node,
        TextSlot::Label,
        &node.label,
        LABEL_SIZE * zoom,
        size.width - 40.0 * zoom,
        palette::TEXT_PRIMARY,
        TextAnchor::TopLeft(Point::new(rect.x + 12.0 * zoom, rect.y + 7.0 * zoom)),
    );
    surface.fill_text(label);

    if zoom > PORT_LABEL_MIN_ZOOM {
        let subtitle = ctx.text_run(
            node,
            TextSlot::Subtitle,
            node.kind().as_str(),
            PORT_LABEL_SIZE * zoom,
            size.width - 24.0 * zoom,
            palette::TEXT_SECONDARY,
            TextAnchor::TopLeft(Point::new(rect.x + 12.0 * zoom, rect.y + header + 6.0 * zoom)),
        );
        surface.fill_text(subtitle);

        if let Some(message) = node.error_message.as_deref()
            && node.status == NodeStatus::Error
        {
            let error = ctx.text_run(
                node,
                TextSlot::Status,
                message,
                PORT_LABEL_SIZE * zoom,
                size.width - 24.0 * zoom,
                palette::STATUS_ERROR,
                TextAnchor::TopLeft(Point::new(
                    rect.x + 12.0 * zoom,
                    rect.y + rect.height - 18.0 * zoom,
                )),
            );
            surface.fill_text(error);
        }
    }

    draw_status_indicator(
        surface,
        Point::new(rect.x + rect.width - 16.0 * zoom, rect.y + header / 2.0),
        STATUS_RADIUS * zoom,
        node.status,
        ctx.time,
    );

    for (index, port) in node.ports().enumerate() {
        let Some(pos) = ctx.port_screen_position(node, port) else {
            continue;
        };
        draw_round_port(surface, pos, zoom, port, ctx.is_port_hovered(node, port));

        if zoom > PORT_LABEL_MIN_ZOOM {
            let gap = (PORT_RADIUS + 6.0) * zoom;
            let y = pos.y - PORT_LABEL_SIZE * zoom * 0.6;
            let anchor = match port.direction {
                PortDirection::Input => TextAnchor::TopLeft(Point::new(pos.x + gap, y)),
                PortDirection::Output => TextAnchor::TopRight(Point::new(pos.x - gap, y)),
            };
            let run = ctx.text_run(
                node,
                TextSlot::Port(port.direction, index),
                &port.label,
                PORT_LABEL_SIZE * zoom,
                size.width / 2.0 - gap,
                palette::TEXT_SECONDARY,
                anchor,
            );
            surface.fill_text(run);
        }
    }
}

pub(super) fn draw_round_port(surface: &mut dyn Surface, pos: Point, zoom: f32, port: &Port, hovered: bool) {
    let radius = PORT_RADIUS * zoom;
    let color = match port.direction {
        PortDirection::Input => palette::PORT_INPUT,
        PortDirection::Output => palette::PORT_OUTPUT,
    };
    if hovered {
        surface.fill_circle(pos, radius + 5.0 * zoom, with_alpha(color, 0.3));
    } else {
        surface.fill_circle(pos, radius + 3.0 * zoom, palette::PORT_GLOW);
    }
    surface.fill_circle(pos, radius, color);
    surface.fill_circle(pos, (radius - 2.0 * zoom).max(0.5), with_alpha(Color::WHITE, 0.15));
    if port.connected {
        surface.stroke_circle(
            pos,
            radius + 1.5 * zoom,
            StrokeStyle::new(palette::PORT_CONNECTED_RING, (1.5 * zoom).max(1.0)),
        );
    }
}

/// Spinner, check, cross or bang for the node's status. Idle draws nothing.
pub(super) fn draw_status_indicator(
    surface: &mut dyn Surface,
    center: Point,
    radius: f32,
    status: NodeStatus,
    time: f32,
) {
    let mark = StrokeStyle::new(Color::WHITE, (radius * 0.3).max(1.0));
    match status {
        NodeStatus::Idle => {}
        NodeStatus::Running => {
            let start = (time * 2.0 * PI).rem_euclid(2.0 * PI);
            surface.stroke_circle(center, radius, StrokeStyle::new(with_alpha(palette::STATUS_RUNNING, 0.25), radius * 0.35));
            surface.stroke_arc(
                center,
                radius,
                start,
                start + PI * 1.5,
                StrokeStyle::new(palette::STATUS_RUNNING, radius * 0.35),
            );
        }
        NodeStatus::Success => {
            surface.fill_circle(center, radius, palette::STATUS_SUCCESS);
            surface.stroke_polyline(
                &[
                    Point::new(center.x - radius * 0.45, center.y),
                    Point::new(center.x - radius * 0.1, center.y + radius * 0.4),
                    Point::new(center.x + radius * 0.5, center.y - radius * 0.4),
                ],
                mark,
            );
        }
        NodeStatus::Error => {
            let d = radius * 0.4;
            surface.fill_circle(center, radius, palette::STATUS_ERROR);
            surface.stroke_line(
                Point::new(center.x - d, center.y - d),
                Point::new(center.x + d, center.y + d),
                mark,
            );
            surface.stroke_line(
                Point::new(center.x + d, center.y - d),
                Point::new(center.x - d, center.y + d),
                mark,
            );
        }
        NodeStatus::Warning => {
            surface.fill_circle(center, radius, palette::STATUS_WARNING);
            surface.stroke_line(
                Point::new(center.x, center.y - radius * 0.5),
                Point::new(center.x, center.y + radius * 0.1),
                mark,
            );
            surface.fill_circle(Point::new(center.x, center.y + radius * 0.45), radius * 0.12, Color::WHITE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::DataType;
    use crate::render::DrawCommand;

    fn camera(zoom: f32) -> Camera {
        let mut camera = Camera::default();
        camera.set_canvas_size(800.0, 600.0);
        camera.set_zoom(zoom).unwrap();
        camera
    }

    fn texts(list: &DrawList) -> Vec<String> {
        list.commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text(run) => Some(run.content.clone()),
                _ => None,
            })
            .collect()
    }

    fn render(state: &StateManager, camera: &Camera) -> (DrawList, RenderStats) {
        let mut text = TextCache::new(100);
        let mut ctx = NodeRenderCtx {
            camera,
            state,
            text: &mut text,
            hovered_port: None,
            time: 0.0,
        };
        let mut list = DrawList::new();
        let stats = NodeRenderer::new(100.0).render_all(&mut ctx, &mut list);
        (list, stats)
    }

    #[test]
    fn culls_far_away_nodes() {
        let mut state = StateManager::new();
        state
            .add_node(Node::new("near", NodeKind::Filter, Point::new(-50.0, -50.0)))
            .unwrap();
        state
            .add_node(Node::new("far", NodeKind::Filter, Point::new(5000.0, 5000.0)))
            .unwrap();

        let (_, stats) = render(&state, &camera(1.0));
        assert_eq!(stats, RenderStats { drawn: 1, culled: 1, skipped: 0 });
    }

    #[test]
    fn port_labels_hidden_when_zoomed_out() {
        let mut state = StateManager::new();
        let node = Node::new("n", NodeKind::Transform, Point::new(-100.0, -75.0))
            .with_input("in", DataType::Any, "Payload", false);
        state.add_node(node).unwrap();

        let (close, _) = render(&state, &camera(1.0));
        assert!(texts(&close).iter().any(|t| t == "Payload"));
        let (far, _) = render(&state, &camera(0.5));
        assert!(!texts(&far).iter().any(|t| t == "Payload"));
    }

    #[test]
    fn dispatches_by_kind() {
        let mut state = StateManager::new();
        state
            .add_node(Node::new("t", NodeKind::Test, Point::new(-100.0, -75.0)))
            .unwrap();
        let (list, _) = render(&state, &camera(1.0));
        assert!(texts(&list).iter().any(|t| t == "TEST"));
    }

    #[test]
    fn status_indicators_differ() {
        let mut success = DrawList::new();
        draw_status_indicator(&mut success, Point::ORIGIN, 6.0, NodeStatus::Success, 0.0);
        let mut idle = DrawList::new();
        draw_status_indicator(&mut idle, Point::ORIGIN, 6.0, NodeStatus::Idle, 0.0);
        let mut running = DrawList::new();
        draw_status_indicator(&mut running, Point::ORIGIN, 6.0, NodeStatus::Running, 0.0);

        assert!(idle.is_empty());
        assert!(!success.is_empty());
        assert!(running
            .commands()
            .iter()
            .any(|c| matches!(c, DrawCommand::StrokePolyline(..))));
    }
}
