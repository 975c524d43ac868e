//! Renderers for node kinds with their own look.

use iced::{Color, Point};
use std::f32::consts::PI;

use super::node::{
    NodeRenderCtx, TextAnchor, border_style, draw_status_indicator,
};
use super::text_cache::TextSlot;
use super::{StrokeStyle, Surface, palette, with_alpha};
use crate::config::color_or;
use crate::node::{Node, Port, PortDirection, RADIAL_PORT_RADIUS, SMART_MATRIX_HIT_RADIUS};

const INNER_RADIUS: f32 = 75.0;
const DIAMOND_SIZE: f32 = 28.0;
const TEST_GREEN: Color = Color::from_rgb(0.06, 0.73, 0.51);

pub(super) fn render_smart_matrix(ctx: &mut NodeRenderCtx<'_>, node: &Node, surface: &mut dyn Surface) {
    let zoom = ctx.camera.zoom();
    let center = ctx.camera.to_screen(node.center());
    let body = color_or(&node.color, palette::NODE_BG);
    let mask = RADIAL_PORT_RADIUS * zoom;

    // Outer ring, brighter while hovered or selected.
    let ring_alpha = if node.hovered || node.selected { 0.3 } else { 0.12 };
    surface.fill_circle(center, SMART_MATRIX_HIT_RADIUS * zoom, with_alpha(body, ring_alpha));

    // Ports sit under the mask so only their outer half shows.
    draw_diamond_ports(ctx, node, surface, body);

    surface.fill_circle(center, mask, body);
    surface.fill_circle(center, INNER_RADIUS * zoom, palette::NODE_BG);
    surface.stroke_circle(center, mask, border_style(node, zoom));

    let d = 10.0 * zoom;
    surface.fill_polygon(
        &[
            Point::new(center.x, center.y - d),
            Point::new(center.x + d, center.y),
            Point::new(center.x, center.y + d),
            Point::new(center.x - d, center.y),
        ],
        with_alpha(Color::WHITE, 0.9),
    );

    draw_status_indicator(
        surface,
        Point::new(center.x + mask * 0.7, center.y - mask * 0.7),
        8.0 * zoom,
        node.status,
        ctx.time,
    );

    let label_top = ctx.camera.to_screen(node.position()).y + (node.size().height + 15.0) * zoom;
    let label = ctx.text_run(
        node,
        TextSlot::Label,
        &node.label,
        14.0 * zoom,
        mask * 2.4,
        palette::TEXT_PRIMARY,
        TextAnchor::Center(Point::new(center.x, label_top)),
    );
    surface.fill_text(label);
}

pub(super) fn render_test(ctx: &mut NodeRenderCtx<'_>, node: &Node, surface: &mut dyn Surface) {
    let zoom = ctx.camera.zoom();
    let center = ctx.camera.to_screen(node.center());
    let mask = RADIAL_PORT_RADIUS * zoom;
    let body = color_or(&node.color, palette::NODE_BG);

    surface.fill_circle(center, mask + 20.0 * zoom, with_alpha(TEST_GREEN, 0.3));
    surface.fill_circle(center, mask, palette::NODE_BG);
    surface.stroke_circle(center, mask, border_style(node, zoom));

    let title = ctx.text_run(
        node,
        TextSlot::Label,
        "TEST",
        14.0 * zoom,
        mask * 1.6,
        TEST_GREEN,
        TextAnchor::Center(Point::new(center.x, center.y - 10.0 * zoom)),
    );
    surface.fill_text(title);
    let subtitle = ctx.text_run(
        node,
        TextSlot::Subtitle,
        &node.label,
        12.0 * zoom,
        mask * 1.6,
        palette::TEXT_SECONDARY,
        TextAnchor::Center(Point::new(center.x, center.y + 10.0 * zoom)),
    );
    surface.fill_text(subtitle);

    draw_status_indicator(
        surface,
        Point::new(center.x, center.y + mask * 0.55),
        6.0 * zoom,
        node.status,
        ctx.time,
    );

    draw_diamond_ports(ctx, node, surface, body);
}

fn draw_diamond_ports(ctx: &NodeRenderCtx<'_>, node: &Node, surface: &mut dyn Surface, body: Color) {
    let zoom = ctx.camera.zoom();
    let center = ctx.camera.to_screen(node.center());
    for port in node.ports() {
        let Some(pos) = ctx.port_screen_position(node, port) else {
            continue;
        };
        let angle = (pos.y - center.y).atan2(pos.x - center.x);
        let hovered = ctx.is_port_hovered(node, port);
        // Hovered ports slide outward along their spoke.
        let pos = if hovered {
            Point::new(pos.x + angle.cos() * 10.0 * zoom, pos.y + angle.sin() * 10.0 * zoom)
        } else {
            pos
        };
        draw_diamond(surface, pos, angle, DIAMOND_SIZE * zoom, port, hovered, body);
    }
}

fn draw_diamond(
    surface: &mut dyn Surface,
    pos: Point,
    angle: f32,
    size: f32,
    port: &Port,
    hovered: bool,
    body: Color,
) {
    let color = match port.direction {
        PortDirection::Input => TEST_GREEN,
        PortDirection::Output => palette::PORT_OUTPUT,
    };
    let alpha = if hovered || port.connected { 1.0 } else { 0.5 };

    surface.fill_polygon(&diamond(pos, angle, size / 2.0 + 2.0), body);
    surface.fill_polygon(&diamond(pos, angle, size / 2.0), with_alpha(color, alpha));
    if port.connected {
        surface.stroke_circle(
            pos,
            size * 0.15,
            StrokeStyle::new(palette::PORT_CONNECTED_RING, 1.0),
        );
    }
}

/// Square with one vertex pointing along `angle`.
fn diamond(center: Point, angle: f32, half: f32) -> [Point; 4] {
    [0.0, 0.5, 1.0, 1.5].map(|k| {
        let a = angle + k * PI;
        Point::new(center.x + half * a.cos(), center.y + half * a.sin())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_points_along_spoke() {
        let [tip, _, back, _] = diamond(Point::ORIGIN, 0.0, 10.0);
        assert!((tip.x - 10.0).abs() < 1e-4 && tip.y.abs() < 1e-4);
        assert!((back.x + 10.0).abs() < 1e-4);
    }
}
