use iced::{Point, Rectangle, Size};

use nodeflow::camera::{Camera, CameraState};
use nodeflow::error::CameraError;

fn camera() -> Camera {
    let mut camera = Camera::new(CameraState {
        x: 120.0,
        y: -40.0,
        zoom: 1.5,
        ..CameraState::default()
    })
    .unwrap();
    camera.set_canvas_size(800.0, 600.0);
    camera
}

fn close(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
}

#[test]
fn world_and_screen_round_trip() {
    let camera = camera();
    for world in [Point::ORIGIN, Point::new(-350.5, 999.0), Point::new(120.0, -40.0)] {
        assert!(close(camera.to_world(camera.to_screen(world)), world));
    }
    assert!(close(camera.to_screen(Point::new(120.0, -40.0)), Point::new(400.0, 300.0)));
}

#[test]
fn zoom_keeps_the_point_under_the_cursor() {
    let mut camera = camera();
    let cursor = Point::new(650.0, 120.0);
    let before = camera.to_world(cursor);

    assert!(camera.zoom_to_point(-240.0, cursor, 1.0));
    assert!(camera.zoom() > 1.5);
    assert!(close(camera.to_world(cursor), before));
}

#[test]
fn zoom_is_clamped_to_bounds() {
    let mut camera = camera();
    for _ in 0..50 {
        camera.zoom_to_point(-1000.0, Point::new(10.0, 10.0), 1.0);
    }
    assert_eq!(camera.zoom(), camera.max_zoom());
    assert!(!camera.zoom_to_point(-1000.0, Point::new(10.0, 10.0), 1.0));
}

#[test]
fn invalid_state_is_rejected_without_change() {
    let mut camera = camera();
    let before = camera.state();
    let bad = CameraState {
        zoom: f32::NAN,
        ..before
    };
    assert!(matches!(camera.set_state(bad), Err(CameraError::InvalidCameraState(_))));
    assert!(camera.set_zoom_bounds(2.0, 1.0).is_err());
    assert!(camera.set_zoom(-1.0).is_err());
    assert_eq!(camera.state(), before);
}

#[test]
fn non_finite_pans_are_ignored() {
    let mut camera = camera();
    camera.pan(f32::INFINITY, 3.0);
    assert_eq!((camera.x(), camera.y()), (120.0, -40.0));
    camera.pan(30.0, -15.0);
    assert_eq!((camera.x(), camera.y()), (100.0, -30.0));
}

#[test]
fn fit_bounds_centres_and_zooms() {
    let mut camera = camera();
    camera.fit_bounds(Rectangle::new(Point::new(0.0, 0.0), Size::new(1600.0, 400.0)), 0.0);
    assert_eq!(camera.zoom(), 0.5);
    assert_eq!((camera.x(), camera.y()), (800.0, 200.0));
    assert!(camera.is_rect_visible(Rectangle::new(Point::new(1500.0, 300.0), Size::new(10.0, 10.0))));
}

#[test]
fn zoom_in_at_canvas_centre_pins_the_world_point() {
    let mut camera = Camera::default();
    camera.set_canvas_size(800.0, 600.0);
    let cursor = Point::new(400.0, 300.0);
    let anchored = camera.to_world(cursor);

    assert!(camera.zoom_to_point(-100.0, cursor, 1.0));
    assert!(camera.zoom() > 1.0);
    assert!(camera.zoom() <= camera.max_zoom());
    assert!(close(camera.to_screen(anchored), cursor));
}
