//! Read-only renderers.
//!
//! Renderers never touch scene state. They turn (entity, camera, time) into
//! screen-space draw calls on a [`Surface`]. Layers are recorded into
//! [`DrawList`]s by the engine and replayed into iced frames by the view.

pub mod grid;
pub mod iced_surface;
pub mod kinds;
pub mod link;
pub mod node;
pub mod text_cache;

use iced::{Color, Point, Rectangle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f32,
}

impl StrokeStyle {
    pub fn new(color: Color, width: f32) -> Self {
        Self { color, width }
    }
}

/// A single line of text; `position` is the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub content: String,
    pub position: Point,
    pub size: f32,
    pub color: Color,
}

/// Screen-space drawing target.
pub trait Surface {
    fn fill_rect(&mut self, rect: Rectangle, color: Color);
    fn fill_rounded_rect(&mut self, rect: Rectangle, radius: f32, color: Color);
    fn stroke_rounded_rect(&mut self, rect: Rectangle, radius: f32, stroke: StrokeStyle);
    fn fill_circle(&mut self, center: Point, radius: f32, color: Color);
    fn stroke_circle(&mut self, center: Point, radius: f32, stroke: StrokeStyle);
    fn stroke_line(&mut self, from: Point, to: Point, stroke: StrokeStyle);
    fn stroke_polyline(&mut self, points: &[Point], stroke: StrokeStyle);
    fn stroke_bezier(&mut self, start: Point, cp1: Point, cp2: Point, end: Point, stroke: StrokeStyle);
    fn fill_polygon(&mut self, points: &[Point], color: Color);
    fn fill_text(&mut self, text: TextRun);

    /// Arc from `start` to `end` radians, drawn as a polyline.
    fn stroke_arc(&mut self, center: Point, radius: f32, start: f32, end: f32, stroke: StrokeStyle) {
        let steps = 24;
        let points: Vec<Point> = (0..=steps)
            .map(|i| {
                let angle = start + (end - start) * i as f32 / steps as f32;
                Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
            })
            .collect();
        self.stroke_polyline(&points, stroke);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect(Rectangle, Color),
    FillRoundedRect(Rectangle, f32, Color),
    StrokeRoundedRect(Rectangle, f32, StrokeStyle),
    FillCircle(Point, f32, Color),
    StrokeCircle(Point, f32, StrokeStyle),
    StrokeLine(Point, Point, StrokeStyle),
    StrokePolyline(Vec<Point>, StrokeStyle),
    StrokeBezier([Point; 4], StrokeStyle),
    FillPolygon(Vec<Point>, Color),
    Text(TextRun),
}

/// Recorded draw calls for one layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Truncate back to a previous length, dropping a partially drawn entity.
    pub fn truncate(&mut self, len: usize) {
        self.commands.truncate(len);
    }

    pub fn replay(&self, target: &mut dyn Surface) {
        for command in &self.commands {
            match command {
                DrawCommand::FillRect(rect, color) => target.fill_rect(*rect, *color),
                DrawCommand::FillRoundedRect(rect, r, color) => {
                    target.fill_rounded_rect(*rect, *r, *color)
                }
                DrawCommand::StrokeRoundedRect(rect, r, stroke) => {
                    target.stroke_rounded_rect(*rect, *r, *stroke)
                }
                DrawCommand::FillCircle(c, r, color) => target.fill_circle(*c, *r, *color),
                DrawCommand::StrokeCircle(c, r, stroke) => target.stroke_circle(*c, *r, *stroke),
                DrawCommand::StrokeLine(a, b, stroke) => target.stroke_line(*a, *b, *stroke),
                DrawCommand::StrokePolyline(points, stroke) => {
                    target.stroke_polyline(points, *stroke)
                }
                DrawCommand::StrokeBezier([a, b, c, d], stroke) => {
                    target.stroke_bezier(*a, *b, *c, *d, *stroke)
                }
                DrawCommand::FillPolygon(points, color) => target.fill_polygon(points, *color),
                DrawCommand::Text(run) => target.fill_text(run.clone()),
            }
        }
    }

    /// True if every coordinate in the list is finite.
    pub fn is_finite(&self) -> bool {
        self.is_finite_since(0)
    }

    /// Like [`DrawList::is_finite`], for commands recorded after `start`.
    pub fn is_finite_since(&self, start: usize) -> bool {
        self.commands
            .get(start..)
            .is_none_or(|tail| tail.iter().all(command_is_finite))
    }
}

fn finite_point(p: &Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

fn finite_rect(r: &Rectangle) -> bool {
    r.x.is_finite() && r.y.is_finite() && r.width.is_finite() && r.height.is_finite()
}

fn command_is_finite(command: &DrawCommand) -> bool {
    match command {
        DrawCommand::FillRect(r, _) => finite_rect(r),
        DrawCommand::FillRoundedRect(r, radius, _) => finite_rect(r) && radius.is_finite(),
        DrawCommand::StrokeRoundedRect(r, radius, _) => finite_rect(r) && radius.is_finite(),
        DrawCommand::FillCircle(c, r, _) | DrawCommand::StrokeCircle(c, r, _) => {
            finite_point(c) && r.is_finite()
        }
        DrawCommand::StrokeLine(a, b, _) => finite_point(a) && finite_point(b),
        DrawCommand::StrokePolyline(points, _) | DrawCommand::FillPolygon(points, _) => {
            points.iter().all(finite_point)
        }
        DrawCommand::StrokeBezier(points, _) => points.iter().all(finite_point),
        DrawCommand::Text(run) => finite_point(&run.position) && run.size.is_finite(),
    }
}

impl Surface for DrawList {
    fn fill_rect(&mut self, rect: Rectangle, color: Color) {
        self.commands.push(DrawCommand::FillRect(rect, color));
    }

    fn fill_rounded_rect(&mut self, rect: Rectangle, radius: f32, color: Color) {
        self.commands
            .push(DrawCommand::FillRoundedRect(rect, radius, color));
    }

    fn stroke_rounded_rect(&mut self, rect: Rectangle, radius: f32, stroke: StrokeStyle) {
        self.commands
            .push(DrawCommand::StrokeRoundedRect(rect, radius, stroke));
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color) {
        self.commands.push(DrawCommand::FillCircle(center, radius, color));
    }

    fn stroke_circle(&mut self, center: Point, radius: f32, stroke: StrokeStyle) {
        self.commands
            .push(DrawCommand::StrokeCircle(center, radius, stroke));
    }

    fn stroke_line(&mut self, from: Point, to: Point, stroke: StrokeStyle) {
        self.commands.push(DrawCommand::StrokeLine(from, to, stroke));
    }

    fn stroke_polyline(&mut self, points: &[Point], stroke: StrokeStyle) {
        if points.len() > 1 {
            self.commands
                .push(DrawCommand::StrokePolyline(points.to_vec(), stroke));
        }
    }

    fn stroke_bezier(&mut self, start: Point, cp1: Point, cp2: Point, end: Point, stroke: StrokeStyle) {
        self.commands
            .push(DrawCommand::StrokeBezier([start, cp1, cp2, end], stroke));
    }

    fn fill_polygon(&mut self, points: &[Point], color: Color) {
        if points.len() > 2 {
            self.commands
                .push(DrawCommand::FillPolygon(points.to_vec(), color));
        }
    }

    fn fill_text(&mut self, text: TextRun) {
        if !text.content.is_empty() {
            self.commands.push(DrawCommand::Text(text));
        }
    }
}

/// Multiply a colour's alpha.
pub fn with_alpha(color: Color, alpha: f32) -> Color {
    Color {
        a: color.a * alpha,
        ..color
    }
}

// Color palette - dark canvas, light strokes
pub mod palette {
    use iced::Color;

    pub const CANVAS_BG: Color = Color::from_rgb(0.075, 0.075, 0.085);

    pub const NODE_BG: Color = Color::from_rgb(0.11, 0.11, 0.13);
    pub const NODE_HEADER: Color = Color::from_rgb(0.15, 0.15, 0.18);
    pub const NODE_BORDER: Color = Color::from_rgb(0.22, 0.22, 0.26);
    pub const NODE_BORDER_HOVER: Color = Color::from_rgb(0.38, 0.65, 0.98); // #60a5fa
    pub const NODE_BORDER_SELECTED: Color = Color::from_rgb(0.23, 0.51, 0.96); // #3b82f6
    pub const NODE_BORDER_ERROR: Color = Color::from_rgb(0.94, 0.27, 0.27); // #ef4444
    pub const SHADOW: Color = Color::from_rgba(0.0, 0.0, 0.0, 0.4);

    pub const PORT_INPUT: Color = Color::from_rgb(0.30, 0.75, 0.85);
    pub const PORT_OUTPUT: Color = Color::from_rgb(0.92, 0.65, 0.25);
    pub const PORT_CONNECTED_RING: Color = Color::from_rgba(1.0, 1.0, 1.0, 0.6);
    pub const PORT_GLOW: Color = Color::from_rgba(1.0, 1.0, 1.0, 0.12);

    pub const STATUS_RUNNING: Color = Color::from_rgb(0.23, 0.51, 0.96);
    pub const STATUS_SUCCESS: Color = Color::from_rgb(0.06, 0.73, 0.51); // #10b981
    pub const STATUS_ERROR: Color = Color::from_rgb(0.94, 0.27, 0.27);
    pub const STATUS_WARNING: Color = Color::from_rgb(0.96, 0.62, 0.04);

    pub const TEXT_PRIMARY: Color = Color::from_rgb(0.92, 0.92, 0.94);
    pub const TEXT_SECONDARY: Color = Color::from_rgb(0.55, 0.55, 0.60);

    pub const PREVIEW_VALID: Color = Color::from_rgb(0.06, 0.73, 0.51);
    pub const PREVIEW_INVALID: Color = Color::from_rgb(0.94, 0.27, 0.27);
    pub const PREVIEW_PENDING: Color = Color::from_rgba(1.0, 1.0, 1.0, 0.6);

    pub const SELECTION_FILL: Color = Color::from_rgba(0.23, 0.51, 0.96, 0.12);
    pub const SELECTION_BORDER: Color = Color::from_rgba(0.23, 0.51, 0.96, 0.8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_reproduces_commands() {
        let mut list = DrawList::new();
        list.fill_circle(Point::new(1.0, 2.0), 3.0, Color::WHITE);
        list.stroke_arc(Point::ORIGIN, 5.0, 0.0, 1.0, StrokeStyle::new(Color::BLACK, 1.0));
        // Empty text and single-point polylines are dropped.
        list.stroke_polyline(&[Point::ORIGIN], StrokeStyle::new(Color::BLACK, 1.0));
        list.fill_text(TextRun {
            content: String::new(),
            position: Point::ORIGIN,
            size: 12.0,
            color: Color::WHITE,
        });

        let mut copy = DrawList::new();
        list.replay(&mut copy);
        assert_eq!(copy, list);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn non_finite_commands_are_detected() {
        let mut list = DrawList::new();
        list.fill_circle(Point::new(f32::NAN, 0.0), 1.0, Color::WHITE);
        assert!(!list.is_finite());
    }
}
