use iced::{Color, Point, Rectangle};
use std::f32::consts::PI;

use super::{StrokeStyle, Surface, palette, with_alpha};
use crate::camera::Camera;
use crate::config::{LinkStyle, parse_color};
use crate::error::ConfigError;
use crate::link::{Link, LinkGeometry, LinkStatus, control_points};

const ARROW_ANGLE: f32 = PI / 6.0;
const ARROW_SIZE: f32 = 8.0;
const PULSE_RADIUS: f32 = 4.0;
/// Extra screen margin so arrowheads and glows are not clipped by culling.
const CULL_MARGIN: f32 = 16.0;

/// How a connection being dragged should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewState {
    #[default]
    Pending,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkHighlight {
    pub hovered: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy)]
struct LinkColors {
    idle: Color,
    active: Color,
    error: Color,
    hover: Color,
}

pub struct LinkRenderer {
    style: LinkStyle,
    colors: LinkColors,
}

impl LinkRenderer {
    pub fn new(style: LinkStyle) -> Result<Self, ConfigError> {
        let colors = LinkColors {
            idle: parse_color(&style.idle_color)?,
            active: parse_color(&style.active_color)?,
            error: parse_color(&style.error_color)?,
            hover: parse_color(&style.hover_color)?,
        };
        Ok(Self { style, colors })
    }

    pub fn style(&self) -> &LinkStyle {
        &self.style
    }

    fn color_for(&self, status: LinkStatus, highlight: LinkHighlight) -> Color {
        if highlight.hovered || highlight.selected {
            return self.colors.hover;
        }
        match status {
            LinkStatus::Idle => self.colors.idle,
            LinkStatus::Active => self.colors.active,
            LinkStatus::Error => self.colors.error,
        }
    }

    /// Draw one link. Returns false when the link was culled.
    pub fn render(
        &self,
        surface: &mut dyn Surface,
        camera: &Camera,
        link: &Link,
        geometry: &LinkGeometry,
        highlight: LinkHighlight,
        time: f32,
    ) -> bool {
        if !is_on_screen(camera, geometry) {
            return false;
        }

        let zoom = camera.zoom();
        let color = self.color_for(link.status, highlight);
        let base = if highlight.selected {
            self.style.selected_width
        } else {
            self.style.width
        };
        let width = (base * zoom).max(1.0);

        let [start, cp1, cp2, end] =
            [geometry.start, geometry.cp1, geometry.cp2, geometry.end].map(|p| camera.to_screen(p));

        if highlight.hovered || highlight.selected {
            surface.stroke_bezier(start, cp1, cp2, end, StrokeStyle::new(with_alpha(color, 0.25), width * 4.0));
        }
        surface.stroke_bezier(start, cp1, cp2, end, StrokeStyle::new(color, width));

        if self.style.arrows {
            // Direction of travel into the target, from the last sampled segment.
            let path = geometry.render_path();
            let before = path
                .len()
                .checked_sub(2)
                .and_then(|i| path.get(i))
                .copied()
                .unwrap_or(geometry.cp2);
            draw_arrow(surface, camera.to_screen(before), end, ARROW_SIZE * zoom, color);
        }

        if self.style.pulses && link.status == LinkStatus::Active {
            let length = geometry.path_length();
            for distance in pulse_positions(length, time, self.style.pulse_speed, self.style.pulse_count) {
                if let Some(p) = geometry.point_at_distance(distance) {
                    let p = camera.to_screen(p);
                    surface.fill_circle(p, PULSE_RADIUS * 2.0 * zoom, with_alpha(color, 0.25));
                    surface.fill_circle(p, PULSE_RADIUS * zoom, color);
                }
            }
        }
        true
    }

    /// Draw the connection currently being dragged, in world coordinates.
    ///
    /// `from_output` is false when the drag started on an input port, in
    /// which case the curve bends the other way.
    pub fn render_preview(
        &self,
        surface: &mut dyn Surface,
        camera: &Camera,
        anchor: Point,
        cursor: Point,
        from_output: bool,
        state: PreviewState,
    ) {
        let (start, end) = if from_output {
            (anchor, cursor)
        } else {
            (cursor, anchor)
        };
        let (cp1, cp2) = control_points(start, end);
        let color = match state {
            PreviewState::Pending => palette::PREVIEW_PENDING,
            PreviewState::Valid => palette::PREVIEW_VALID,
            PreviewState::Invalid => palette::PREVIEW_INVALID,
        };
        let zoom = camera.zoom();
        let [s, c1, c2, e] = [start, cp1, cp2, end].map(|p| camera.to_screen(p));

        surface.stroke_bezier(s, c1, c2, e, StrokeStyle::new(with_alpha(Color::WHITE, 0.1), 10.0 * zoom));
        surface.stroke_bezier(s, c1, c2, e, StrokeStyle::new(color, (3.0 * zoom).max(1.0)));

        let tip = camera.to_screen(cursor);
        surface.fill_circle(tip, 6.0 * zoom, with_alpha(Color::WHITE, 0.3));
        surface.fill_circle(tip, 3.0 * zoom, color);
    }
}

/// Distances along a link of length `length` at which pulses sit at time `t`
/// (seconds). Evenly spaced, travelling at `speed` world units per second.
pub fn pulse_positions(length: f32, t: f32, speed: f32, count: u32) -> Vec<f32> {
    if count == 0 || !length.is_finite() || length <= 0.0 {
        return Vec::new();
    }
    (0..count)
        .map(|i| (t * speed + i as f32 / count as f32 * length).rem_euclid(length))
        .collect()
}

fn is_on_screen(camera: &Camera, geometry: &LinkGeometry) -> bool {
    if !geometry.is_finite() {
        return false;
    }
    let bbox = geometry.bounding_box();
    let min = camera.to_screen(Point::new(bbox.x, bbox.y));
    let max = camera.to_screen(Point::new(bbox.x + bbox.width, bbox.y + bbox.height));
    let canvas = camera.canvas_size();
    let screen = Rectangle {
        x: -CULL_MARGIN,
        y: -CULL_MARGIN,
        width: canvas.width + CULL_MARGIN * 2.0,
        height: canvas.height + CULL_MARGIN * 2.0,
    };
    !(max.x < screen.x
        || min.x > screen.x + screen.width
        || max.y < screen.y
        || min.y > screen.y + screen.height)
}

fn draw_arrow(surface: &mut dyn Surface, from: Point, tip: Point, size: f32, color: Color) {
    let angle = (tip.y - from.y).atan2(tip.x - from.x);
    let left = Point::new(
        tip.x - size * (angle - ARROW_ANGLE).cos(),
        tip.y - size * (angle - ARROW_ANGLE).sin(),
    );
    let right = Point::new(
        tip.x - size * (angle + ARROW_ANGLE).cos(),
        tip.y - size * (angle + ARROW_ANGLE).sin(),
    );
    surface.fill_polygon(&[tip, left, right], color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCommand, DrawList};

    fn camera() -> Camera {
        let mut camera = Camera::default();
        camera.set_canvas_size(800.0, 600.0);
        camera
    }

    fn link(status: LinkStatus) -> Link {
        let mut link = Link::new("a", "out", "b", "in");
        link.status = status;
        link
    }

    #[test]
    fn pulses_wrap_around_the_path() {
        let positions = pulse_positions(300.0, 1.0, 200.0, 3);
        assert_eq!(positions.len(), 3);
        assert!((positions[0] - 200.0).abs() < 1e-3);
        assert!((positions[1] - 0.0).abs() < 1e-3);
        assert!((positions[2] - 100.0).abs() < 1e-3);
        assert!(pulse_positions(0.0, 1.0, 200.0, 3).is_empty());
    }

    #[test]
    fn only_active_links_pulse() {
        let renderer = LinkRenderer::new(LinkStyle::default()).unwrap();
        let geometry = LinkGeometry::new(Point::new(-100.0, 0.0), Point::new(100.0, 50.0));
        let circles = |status| {
            let mut list = DrawList::new();
            renderer.render(&mut list, &camera(), &link(status), &geometry, LinkHighlight::default(), 0.5);
            list.commands()
                .iter()
                .filter(|c| matches!(c, DrawCommand::FillCircle(..)))
                .count()
        };
        assert_eq!(circles(LinkStatus::Idle), 0);
        assert_eq!(circles(LinkStatus::Active), 6);
    }

    #[test]
    fn off_screen_links_are_culled() {
        let renderer = LinkRenderer::new(LinkStyle::default()).unwrap();
        let geometry = LinkGeometry::new(Point::new(5000.0, 5000.0), Point::new(5200.0, 5000.0));
        let mut list = DrawList::new();
        let drawn = renderer.render(&mut list, &camera(), &link(LinkStatus::Idle), &geometry, LinkHighlight::default(), 0.0);
        assert!(!drawn);
        assert!(list.is_empty());
    }

    #[test]
    fn arrowhead_points_at_target() {
        let renderer = LinkRenderer::new(LinkStyle::default()).unwrap();
        let geometry = LinkGeometry::new(Point::new(-100.0, 0.0), Point::new(100.0, 0.0));
        let mut list = DrawList::new();
        renderer.render(&mut list, &camera(), &link(LinkStatus::Idle), &geometry, LinkHighlight::default(), 0.0);

        let arrow = list.commands().iter().find_map(|c| match c {
            DrawCommand::FillPolygon(points, _) => Some(points.clone()),
            _ => None,
        });
        let arrow = arrow.expect("arrowhead drawn");
        let tip = camera().to_screen(Point::new(100.0, 0.0));
        assert_eq!(arrow[0], tip);
        assert!(arrow[1].x < tip.x && arrow[2].x < tip.x);
    }

    #[test]
    fn preview_colour_follows_validity() {
        let renderer = LinkRenderer::new(LinkStyle::default()).unwrap();
        let mut list = DrawList::new();
        renderer.render_preview(
            &mut list,
            &camera(),
            Point::ORIGIN,
            Point::new(100.0, 0.0),
            true,
            PreviewState::Invalid,
        );
        assert!(list.commands().iter().any(|c| matches!(
            c,
            DrawCommand::StrokeBezier(_, stroke) if stroke.color == palette::PREVIEW_INVALID
        )));
    }
}
