use iced::{Point, Rectangle, Size};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CameraError;

pub const DEFAULT_MIN_ZOOM: f32 = 0.1;
pub const DEFAULT_MAX_ZOOM: f32 = 5.0;

/// Base exponential rate applied to wheel deltas before sensitivity.
const ZOOM_SPEED: f32 = 0.002;

/// Persistable subset of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraState {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

impl CameraState {
    pub fn validate(&self) -> Result<(), CameraError> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(CameraError::InvalidCameraState(format!(
                "position ({}, {}) must be finite",
                self.x, self.y
            )));
        }
        validate_bounds(self.min_zoom, self.max_zoom)?;
        validate_zoom(self.zoom)
    }
}

/// Affine view transform: world point `(x, y)` sits at the canvas centre.
///
/// All sizes are logical pixels; the device pixel ratio is only carried so
/// layers can derive their physical buffer size.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    x: f32,
    y: f32,
    zoom: f32,
    min_zoom: f32,
    max_zoom: f32,
    canvas_width: f32,
    canvas_height: f32,
    device_pixel_ratio: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            canvas_width: 0.0,
            canvas_height: 0.0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl Camera {
    pub fn new(state: CameraState) -> Result<Self, CameraError> {
        state.validate()?;
        let mut camera = Self::default();
        camera.set_state(state)?;
        Ok(camera)
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn min_zoom(&self) -> f32 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f32 {
        self.max_zoom
    }

    pub fn canvas_size(&self) -> Size {
        Size::new(self.canvas_width, self.canvas_height)
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    pub fn to_screen(&self, world: Point) -> Point {
        Point::new(
            (world.x - self.x) * self.zoom + self.canvas_width / 2.0,
            (world.y - self.y) * self.zoom + self.canvas_height / 2.0,
        )
    }

    pub fn to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.canvas_width / 2.0) / self.zoom + self.x,
            (screen.y - self.canvas_height / 2.0) / self.zoom + self.y,
        )
    }

    /// Pan by a screen-space delta. Dragging right moves the world right.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            warn!(dx, dy, "ignoring non-finite pan delta");
            return;
        }
        self.x -= dx / self.zoom;
        self.y -= dy / self.zoom;
    }

    /// Exponential zoom that keeps the world point under `screen` fixed.
    ///
    /// Negative deltas zoom in. Returns whether the zoom changed.
    pub fn zoom_to_point(&mut self, delta: f32, screen: Point, sensitivity: f32) -> bool {
        if !delta.is_finite() || !sensitivity.is_finite() {
            warn!(delta, sensitivity, "ignoring non-finite zoom input");
            return false;
        }
        let factor = (-delta * ZOOM_SPEED * sensitivity).exp();
        let target = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if target == self.zoom {
            return false;
        }

        let before = self.to_world(screen);
        self.zoom = target;
        let after = self.to_world(screen);
        self.x += before.x - after.x;
        self.y += before.y - after.y;
        true
    }

    /// Rejects non-finite or non-positive zoom, clamps anything else.
    pub fn set_zoom(&mut self, zoom: f32) -> Result<(), CameraError> {
        validate_zoom(zoom)?;
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        Ok(())
    }

    pub fn set_zoom_bounds(&mut self, min: f32, max: f32) -> Result<(), CameraError> {
        validate_bounds(min, max)?;
        self.min_zoom = min;
        self.max_zoom = max;
        self.zoom = self.zoom.clamp(min, max);
        Ok(())
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        if x.is_finite() && y.is_finite() {
            self.x = x;
            self.y = y;
        } else {
            warn!(x, y, "ignoring non-finite camera position");
        }
    }

    pub fn set_canvas_size(&mut self, width: f32, height: f32) {
        self.canvas_width = if width.is_finite() { width.max(0.0) } else { 0.0 };
        self.canvas_height = if height.is_finite() { height.max(0.0) } else { 0.0 };
    }

    pub fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.device_pixel_ratio = if ratio.is_finite() { ratio.max(1.0) } else { 1.0 };
    }

    pub fn center_on(&mut self, world: Point) {
        self.set_position(world.x, world.y);
    }

    /// World-space rectangle currently visible on the canvas.
    pub fn viewport_bounds(&self) -> Rectangle {
        let min = self.to_world(Point::ORIGIN);
        let max = self.to_world(Point::new(self.canvas_width, self.canvas_height));
        Rectangle::new(min, Size::new(max.x - min.x, max.y - min.y))
    }

    pub fn is_rect_visible(&self, rect: Rectangle) -> bool {
        let view = self.viewport_bounds();
        !(rect.x + rect.width < view.x
            || rect.x > view.x + view.width
            || rect.y + rect.height < view.y
            || rect.y > view.y + view.height)
    }

    /// Centre on `bounds` and zoom so it fits inside the canvas minus padding.
    pub fn fit_bounds(&mut self, bounds: Rectangle, padding: f32) {
        let avail_w = self.canvas_width - padding * 2.0;
        let avail_h = self.canvas_height - padding * 2.0;
        if bounds.width > 0.0 && bounds.height > 0.0 && avail_w > 0.0 && avail_h > 0.0 {
            let zoom = (avail_w / bounds.width).min(avail_h / bounds.height);
            self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        }
        self.center_on(bounds.center());
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.zoom = 1.0_f32.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            x: self.x,
            y: self.y,
            zoom: self.zoom,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
        }
    }

    pub fn set_state(&mut self, state: CameraState) -> Result<(), CameraError> {
        state.validate()?;
        self.x = state.x;
        self.y = state.y;
        self.min_zoom = state.min_zoom;
        self.max_zoom = state.max_zoom;
        self.zoom = state.zoom.clamp(state.min_zoom, state.max_zoom);
        Ok(())
    }

    /// Restore a usable state after numeric drift. Returns true if anything
    /// had to be repaired.
    pub fn sanitize(&mut self) -> bool {
        let mut repaired = false;
        if !self.x.is_finite() || !self.y.is_finite() {
            warn!(x = self.x, y = self.y, "camera position drifted, recentring");
            self.x = 0.0;
            self.y = 0.0;
            repaired = true;
        }
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            warn!(zoom = self.zoom, "camera zoom drifted, resetting");
            self.zoom = 1.0_f32.clamp(self.min_zoom, self.max_zoom);
            repaired = true;
        } else if self.zoom < self.min_zoom || self.zoom > self.max_zoom {
            self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
            repaired = true;
        }
        repaired
    }
}

fn validate_zoom(zoom: f32) -> Result<(), CameraError> {
    if !zoom.is_finite() || zoom <= 0.0 {
        return Err(CameraError::InvalidCameraState(format!(
            "zoom must be a positive finite number (got {zoom})"
        )));
    }
    Ok(())
}

fn validate_bounds(min: f32, max: f32) -> Result<(), CameraError> {
    if !min.is_finite() || !max.is_finite() || min <= 0.0 || max <= 0.0 {
        return Err(CameraError::InvalidCameraState(format!(
            "zoom bounds must be positive (got {min}..{max})"
        )));
    }
    if min >= max {
        return Err(CameraError::InvalidCameraState(format!(
            "min zoom {min} must be less than max zoom {max}"
        )));
    }
    Ok(())
}
