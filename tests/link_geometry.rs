use iced::Point;

use nodeflow::link::{
    ANIMATION_SEGMENTS, HIT_SEGMENTS, LinkGeometry, RENDER_SEGMENTS, point_at_distance, sample_bezier,
};

#[test]
fn paths_have_one_more_sample_than_segments() {
    let geometry = LinkGeometry::new(Point::new(0.0, 0.0), Point::new(300.0, 120.0));
    assert_eq!(geometry.render_path().len(), RENDER_SEGMENTS + 1);
    assert_eq!(geometry.bezier_path(HIT_SEGMENTS).len(), HIT_SEGMENTS + 1);
    assert_eq!(geometry.bezier_path(ANIMATION_SEGMENTS).len(), ANIMATION_SEGMENTS + 1);
    assert_eq!(geometry.render_path().first(), Some(&geometry.start));
    assert_eq!(geometry.render_path().last(), Some(&geometry.end));
}

#[test]
fn length_is_at_least_the_chord() {
    let start = Point::new(10.0, 10.0);
    let end = Point::new(410.0, 310.0);
    let geometry = LinkGeometry::new(start, end);
    assert!(geometry.path_length() >= start.distance(end));
}

#[test]
fn point_at_distance_stays_on_the_ends() {
    let geometry = LinkGeometry::new(Point::new(0.0, 0.0), Point::new(200.0, 0.0));
    assert_eq!(geometry.point_at_distance(-5.0), Some(geometry.start));
    assert_eq!(geometry.point_at_distance(geometry.path_length() * 4.0), Some(geometry.end));

    let middle = geometry.point_at_distance(geometry.path_length() / 2.0).unwrap();
    assert!((middle.x - 100.0).abs() < 1.0);
    assert_eq!(point_at_distance(&[], 3.0), None);
}

#[test]
fn hit_test_follows_the_curve() {
    let geometry = LinkGeometry::new(Point::new(0.0, 0.0), Point::new(300.0, 200.0));
    let on_curve = geometry.bezier_path(10)[5];
    assert!(geometry.contains_point(on_curve, 2.0));
    assert!(!geometry.contains_point(Point::new(0.0, 200.0), 8.0));
}

#[test]
fn bounding_box_covers_control_points() {
    let geometry = LinkGeometry::new(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
    let bbox = geometry.bounding_box();
    assert!(bbox.x <= geometry.cp2.x);
    assert!(bbox.x + bbox.width >= geometry.cp1.x);
    assert!(geometry.is_finite());
    assert!(!LinkGeometry::new(Point::new(f32::NAN, 0.0), Point::ORIGIN).is_finite());
}

#[test]
fn zero_segments_yield_the_start() {
    let p = Point::new(3.0, 4.0);
    assert_eq!(sample_bezier(p, p, p, Point::ORIGIN, 0), vec![p]);
}

#[test]
fn full_length_lands_on_the_end_of_an_s_curve() {
    for end in [Point::new(-600.0, 400.0), Point::new(200.0, 300.0)] {
        let geometry = LinkGeometry::new(Point::ORIGIN, end);
        let at_end = geometry.point_at_distance(geometry.path_length()).unwrap();
        assert!(at_end.distance(end) < 0.01, "{at_end:?} vs {end:?}");
    }
}
