use iced::{Color, Point, Rectangle};

use super::{Surface, StrokeStyle, palette, with_alpha};
use crate::camera::Camera;
use crate::config::{GridConfig, GridKind, parse_color};
use crate::error::ConfigError;

/// Upper bound on lines (or dot rows/columns) per axis and pass.
const MAX_LINES_PER_AXIS: usize = 400;
/// The sub-grid only shows once cells are large enough to read.
const SUB_GRID_MIN_ZOOM: f32 = 0.5;

/// Grid pitch in world units, stepped so on-screen density stays bounded.
pub fn adaptive_size(base: f32, zoom: f32) -> f32 {
    if zoom < 0.25 {
        base * 8.0
    } else if zoom < 0.5 {
        base * 4.0
    } else if zoom < 1.0 {
        base * 2.0
    } else if zoom > 4.0 {
        base * 0.25
    } else if zoom > 2.0 {
        base * 0.5
    } else {
        base
    }
}

pub fn snap_to_grid(p: Point, size: f32) -> Point {
    if size <= 0.0 {
        return p;
    }
    Point::new((p.x / size).round() * size, (p.y / size).round() * size)
}

pub struct GridRenderer {
    config: GridConfig,
    color: Color,
    sub_color: Color,
}

impl GridRenderer {
    pub fn new(config: GridConfig) -> Result<Self, ConfigError> {
        if !config.size.is_finite() || config.size <= 0.0 {
            return Err(ConfigError::InvalidGridSize(config.size));
        }
        let color = parse_color(&config.color)?;
        let sub_color = parse_color(&config.sub_color)?;
        Ok(Self {
            config,
            color,
            sub_color,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn kind(&self) -> GridKind {
        self.config.kind
    }

    pub fn set_kind(&mut self, kind: GridKind) {
        self.config.kind = kind;
    }

    pub fn color(&self) -> &str {
        &self.config.color
    }

    pub fn set_color(&mut self, hex: &str) -> Result<(), ConfigError> {
        self.color = parse_color(hex)?;
        self.config.color = hex.to_string();
        Ok(())
    }

    pub fn render(&self, surface: &mut dyn Surface, camera: &Camera) {
        let size = camera.canvas_size();
        surface.fill_rect(
            Rectangle::new(Point::ORIGIN, size),
            palette::CANVAS_BG,
        );

        let view = camera.viewport_bounds();
        let pitch = adaptive_size(self.config.size, camera.zoom());

        if self.config.sub_grid && self.config.sub_divisions > 1 && camera.zoom() > SUB_GRID_MIN_ZOOM {
            let sub = pitch / self.config.sub_divisions as f32;
            let color = with_alpha(self.sub_color, self.config.sub_opacity);
            self.draw_pass(surface, camera, view, sub, color);
        }

        let color = with_alpha(self.color, self.config.opacity);
        self.draw_pass(surface, camera, view, pitch, color);
    }

    fn draw_pass(&self, surface: &mut dyn Surface, camera: &Camera, view: Rectangle, pitch: f32, color: Color) {
        let pitch = coarsen_pitch(pitch, view.width.max(view.height));
        let xs = grid_steps(view.x, view.x + view.width, pitch);
        let ys = grid_steps(view.y, view.y + view.height, pitch);

        match self.config.kind {
            GridKind::Lines => {
                let stroke = StrokeStyle::new(color, 1.0);
                for x in &xs {
                    let top = camera.to_screen(Point::new(*x, view.y));
                    let bottom = camera.to_screen(Point::new(*x, view.y + view.height));
                    surface.stroke_line(top, bottom, stroke);
                }
                for y in &ys {
                    let left = camera.to_screen(Point::new(view.x, *y));
                    let right = camera.to_screen(Point::new(view.x + view.width, *y));
                    surface.stroke_line(left, right, stroke);
                }
            }
            GridKind::Dots => {
                let radius = (1.5 * camera.zoom()).max(1.0);
                for x in &xs {
                    for y in &ys {
                        surface.fill_circle(camera.to_screen(Point::new(*x, *y)), radius, color);
                    }
                }
            }
        }
    }
}

/// Double `pitch` until `extent` holds at most [`MAX_LINES_PER_AXIS`] cells.
fn coarsen_pitch(pitch: f32, extent: f32) -> f32 {
    let mut pitch = pitch;
    // f32 runs out of exponent long before this.
    for _ in 0..128 {
        if !(pitch > 0.0 && extent.is_finite()) || extent / pitch <= MAX_LINES_PER_AXIS as f32 {
            break;
        }
        pitch *= 2.0;
    }
    pitch
}

/// World coordinates of grid lines covering `[min, max]`.
fn grid_steps(min: f32, max: f32, pitch: f32) -> Vec<f32> {
    if !(min.is_finite() && max.is_finite() && pitch.is_finite()) || pitch <= 0.0 || max < min {
        return Vec::new();
    }
    let start = (min / pitch).floor() as i64;
    let end = (max / pitch).floor() as i64;
    (start..=end).map(|i| i as f32 * pitch).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{DrawCommand, DrawList};

    #[test]
    fn pitch_steps_with_zoom() {
        assert_eq!(adaptive_size(50.0, 0.2), 400.0);
        assert_eq!(adaptive_size(50.0, 0.3), 200.0);
        assert_eq!(adaptive_size(50.0, 0.7), 100.0);
        assert_eq!(adaptive_size(50.0, 1.5), 50.0);
        assert_eq!(adaptive_size(50.0, 3.0), 25.0);
        assert_eq!(adaptive_size(50.0, 4.5), 12.5);
    }

    #[test]
    fn rejects_non_positive_size() {
        let config = GridConfig {
            size: 0.0,
            ..GridConfig::default()
        };
        assert!(GridRenderer::new(config).is_err());
    }

    #[test]
    fn sub_grid_hidden_when_zoomed_out() {
        let renderer = GridRenderer::new(GridConfig::default()).unwrap();
        let mut camera = Camera::default();
        camera.set_canvas_size(400.0, 300.0);

        let mut near = DrawList::new();
        renderer.render(&mut near, &camera);
        camera.set_zoom(0.4).unwrap();
        let mut far = DrawList::new();
        renderer.render(&mut far, &camera);

        let lines = |list: &DrawList| {
            list.commands()
                .iter()
                .filter(|c| matches!(c, DrawCommand::StrokeLine(..)))
                .count()
        };
        assert!(lines(&near) > lines(&far));
    }

    #[test]
    fn dots_scale_with_zoom() {
        let mut renderer = GridRenderer::new(GridConfig::default()).unwrap();
        renderer.set_kind(GridKind::Dots);
        let mut camera = Camera::default();
        camera.set_canvas_size(200.0, 200.0);
        camera.set_zoom(2.0).unwrap();

        let mut list = DrawList::new();
        renderer.render(&mut list, &camera);
        let radius = list.commands().iter().find_map(|c| match c {
            DrawCommand::FillCircle(_, r, _) => Some(*r),
            _ => None,
        });
        assert_eq!(radius, Some(3.0));
    }

    #[test]
    fn huge_viewports_coarsen_instead_of_truncating() {
        let (min, max) = (-5.0e5, 5.0e5);
        let pitch = coarsen_pitch(12.5, max - min);
        assert!(pitch > 12.5);
        assert_eq!((pitch / 12.5).log2().fract(), 0.0);

        let xs = grid_steps(min, max, pitch);
        assert!(xs.len() <= MAX_LINES_PER_AXIS + 1);
        assert!(xs[0] <= min && xs[xs.len() - 1] + pitch > max);
        assert!(xs.windows(2).all(|w| w[1] - w[0] == pitch));
    }

    #[test]
    fn small_viewports_keep_their_pitch() {
        assert_eq!(coarsen_pitch(50.0, 800.0), 50.0);
    }
}
