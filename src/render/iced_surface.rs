use iced::widget::canvas::{self, Frame, Path, Stroke, Text};
use iced::{Color, Point, Rectangle, Size};

use super::{StrokeStyle, Surface, TextRun};

/// Adapter that draws onto an iced canvas frame.
pub struct FrameSurface<'a> {
    frame: &'a mut Frame,
}

impl<'a> FrameSurface<'a> {
    pub fn new(frame: &'a mut Frame) -> Self {
        Self { frame }
    }
}

fn stroke(style: StrokeStyle) -> Stroke<'static> {
    Stroke::default()
        .with_color(style.color)
        .with_width(style.width)
        .with_line_cap(canvas::LineCap::Round)
}

fn rounded_rect(rect: Rectangle, radius: f32) -> Path {
    Path::new(|builder| {
        let r = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
        let x = rect.x;
        let y = rect.y;
        let w = rect.width;
        let h = rect.height;

        builder.move_to(Point::new(x + r, y));
        builder.line_to(Point::new(x + w - r, y));
        builder.arc_to(Point::new(x + w, y), Point::new(x + w, y + r), r);
        builder.line_to(Point::new(x + w, y + h - r));
        builder.arc_to(Point::new(x + w, y + h), Point::new(x + w - r, y + h), r);
        builder.line_to(Point::new(x + r, y + h));
        builder.arc_to(Point::new(x, y + h), Point::new(x, y + h - r), r);
        builder.line_to(Point::new(x, y + r));
        builder.arc_to(Point::new(x, y), Point::new(x + r, y), r);
        builder.close();
    })
}

impl Surface for FrameSurface<'_> {
    fn fill_rect(&mut self, rect: Rectangle, color: Color) {
        self.frame
            .fill_rectangle(rect.position(), Size::new(rect.width, rect.height), color);
    }

    fn fill_rounded_rect(&mut self, rect: Rectangle, radius: f32, color: Color) {
        self.frame.fill(&rounded_rect(rect, radius), color);
    }

    fn stroke_rounded_rect(&mut self, rect: Rectangle, radius: f32, style: StrokeStyle) {
        self.frame.stroke(&rounded_rect(rect, radius), stroke(style));
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color) {
        self.frame.fill(&Path::circle(center, radius), color);
    }

    fn stroke_circle(&mut self, center: Point, radius: f32, style: StrokeStyle) {
        self.frame.stroke(&Path::circle(center, radius), stroke(style));
    }

    fn stroke_line(&mut self, from: Point, to: Point, style: StrokeStyle) {
        self.frame.stroke(&Path::line(from, to), stroke(style));
    }

    fn stroke_polyline(&mut self, points: &[Point], style: StrokeStyle) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let path = Path::new(|builder| {
            builder.move_to(*first);
            for p in rest {
                builder.line_to(*p);
            }
        });
        self.frame.stroke(&path, stroke(style));
    }

    fn stroke_bezier(&mut self, start: Point, cp1: Point, cp2: Point, end: Point, style: StrokeStyle) {
        let path = Path::new(|builder| {
            builder.move_to(start);
            builder.bezier_curve_to(cp1, cp2, end);
        });
        self.frame.stroke(&path, stroke(style));
    }

    fn fill_polygon(&mut self, points: &[Point], color: Color) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        let path = Path::new(|builder| {
            builder.move_to(*first);
            for p in rest {
                builder.line_to(*p);
            }
            builder.close();
        });
        self.frame.fill(&path, color);
    }

    fn fill_text(&mut self, run: TextRun) {
        self.frame.fill_text(Text {
            content: run.content,
            position: run.position,
            color: run.color,
            size: iced::Pixels(run.size),
            ..Text::default()
        });
    }
}
