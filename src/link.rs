use iced::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::node::{Node, NodeId, PortId};

pub const MIN_CONTROL_OFFSET: f32 = 50.0;
pub const MAX_CONTROL_OFFSET: f32 = 200.0;
pub const CONTROL_OFFSET_FACTOR: f32 = 0.4;
pub const DEFAULT_HIT_THRESHOLD: f32 = 8.0;
pub const RENDER_SEGMENTS: usize = 50;
pub const HIT_SEGMENTS: usize = 30;
pub const ANIMATION_SEGMENTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh `link-<uuid>` identifier.
    pub fn generate() -> Self {
        Self(format!("link-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LinkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Idle,
    Active,
    Error,
}

/// Directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: LinkId,
    pub from_node_id: NodeId,
    pub from_port_id: PortId,
    pub to_node_id: NodeId,
    pub to_port_id: PortId,
    #[serde(default)]
    pub status: LinkStatus,
}

impl Link {
    pub fn new(
        from_node: impl Into<NodeId>,
        from_port: impl Into<PortId>,
        to_node: impl Into<NodeId>,
        to_port: impl Into<PortId>,
    ) -> Self {
        Self {
            id: LinkId::generate(),
            from_node_id: from_node.into(),
            from_port_id: from_port.into(),
            to_node_id: to_node.into(),
            to_port_id: to_port.into(),
            status: LinkStatus::Idle,
        }
    }

    pub fn with_id(mut self, id: impl Into<LinkId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from_node_id == node || &self.to_node_id == node
    }

    pub fn uses_port(&self, node: &NodeId, port: &PortId) -> bool {
        (&self.from_node_id == node && &self.from_port_id == port)
            || (&self.to_node_id == node && &self.to_port_id == port)
    }
}

/// Port positions of both ends, aiming radial ports at the opposite node.
/// Unresolvable ports fall back to node centres.
pub fn resolve_endpoints(link: &Link, from: &Node, to: &Node) -> (Point, Point) {
    let start = from.port_position(&link.from_port_id, Some(to.center()));
    let end = to.port_position(&link.to_port_id, Some(from.center()));
    match (start, end) {
        (Some(start), Some(end)) => (start, end),
        (start, end) => {
            warn!(link = %link.id, "port not found for link, using node centres");
            (
                start.unwrap_or_else(|| from.center()),
                end.unwrap_or_else(|| to.center()),
            )
        }
    }
}

/// Horizontal-tangent control points offset by `clamp(dist * 0.4, 50, 200)`.
pub fn control_points(start: Point, end: Point) -> (Point, Point) {
    let offset = (start.distance(end) * CONTROL_OFFSET_FACTOR)
        .clamp(MIN_CONTROL_OFFSET, MAX_CONTROL_OFFSET);
    (
        Point::new(start.x + offset, start.y),
        Point::new(end.x - offset, end.y),
    )
}

pub fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f32) -> Point {
    let t2 = t * t;
    let t3 = t2 * t;
    let mt = 1.0 - t;
    let mt2 = mt * mt;
    let mt3 = mt2 * mt;

    Point::new(
        mt3 * p0.x + 3.0 * mt2 * t * p1.x + 3.0 * mt * t2 * p2.x + t3 * p3.x,
        mt3 * p0.y + 3.0 * mt2 * t * p1.y + 3.0 * mt * t2 * p2.y + t3 * p3.y,
    )
}

/// `segments + 1` evenly spaced samples. Zero segments yields the start only.
pub fn sample_bezier(p0: Point, p1: Point, p2: Point, p3: Point, segments: usize) -> Vec<Point> {
    if segments == 0 {
        return vec![p0];
    }
    (0..=segments)
        .map(|i| {
            // Exact endpoints; avoid t = 0.99999 at the tail.
            if i == segments {
                p3
            } else {
                cubic_bezier(p0, p1, p2, p3, i as f32 / segments as f32)
            }
        })
        .collect()
}

pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

pub fn path_contains(path: &[Point], p: Point, threshold: f32) -> bool {
    match path {
        [] => false,
        [only] => p.distance(*only) <= threshold,
        _ => path
            .windows(2)
            .any(|w| point_segment_distance(p, w[0], w[1]) <= threshold),
    }
}

pub fn path_length(path: &[Point]) -> f32 {
    path.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Linear interpolation along a polyline. `None` only for an empty path.
pub fn point_at_distance(path: &[Point], distance: f32) -> Option<Point> {
    let first = *path.first()?;
    if path.len() == 1 || distance <= 0.0 {
        return Some(first);
    }

    let mut accumulated = 0.0;
    for w in path.windows(2) {
        let segment = w[0].distance(w[1]);
        if segment > 0.0 && accumulated + segment >= distance {
            let t = (distance - accumulated) / segment;
            if t >= 1.0 {
                return Some(w[1]);
            }
            return Some(Point::new(
                w[0].x + t * (w[1].x - w[0].x),
                w[0].y + t * (w[1].y - w[0].y),
            ));
        }
        accumulated += segment;
    }
    path.last().copied()
}

/// Derived curve data for one link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkGeometry {
    pub start: Point,
    pub end: Point,
    pub cp1: Point,
    pub cp2: Point,
    render_path: Vec<Point>,
    hit_path: Vec<Point>,
    animation_path: Vec<Point>,
    length: f32,
}

impl LinkGeometry {
    pub fn new(start: Point, end: Point) -> Self {
        let (cp1, cp2) = control_points(start, end);
        let render_path = sample_bezier(start, cp1, cp2, end, RENDER_SEGMENTS);
        let hit_path = sample_bezier(start, cp1, cp2, end, HIT_SEGMENTS);
        let animation_path = sample_bezier(start, cp1, cp2, end, ANIMATION_SEGMENTS);
        // Same polyline that `point_at_distance` walks.
        let length = path_length(&animation_path);
        Self {
            start,
            end,
            cp1,
            cp2,
            render_path,
            hit_path,
            animation_path,
            length,
        }
    }

    pub fn for_link(link: &Link, from: &Node, to: &Node) -> Self {
        let (start, end) = resolve_endpoints(link, from, to);
        Self::new(start, end)
    }

    pub fn bezier_path(&self, segments: usize) -> Vec<Point> {
        sample_bezier(self.start, self.cp1, self.cp2, self.end, segments)
    }

    pub fn render_path(&self) -> &[Point] {
        &self.render_path
    }

    pub fn contains_point(&self, p: Point, threshold: f32) -> bool {
        path_contains(&self.hit_path, p, threshold)
    }

    pub fn path_length(&self) -> f32 {
        self.length
    }

    pub fn point_at_distance(&self, distance: f32) -> Option<Point> {
        point_at_distance(&self.animation_path, distance)
    }

    pub fn is_finite(&self) -> bool {
        [self.start, self.end, self.cp1, self.cp2]
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Axis-aligned box around endpoints and control points.
    pub fn bounding_box(&self) -> iced::Rectangle {
        let xs = [self.start.x, self.end.x, self.cp1.x, self.cp2.x];
        let ys = [self.start.y, self.end.y, self.cp1.y, self.cp2.y];
        let min_x = xs.iter().copied().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().copied().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        iced::Rectangle {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

struct CachedGeometry {
    from: NodeId,
    to: NodeId,
    from_version: u64,
    to_version: u64,
    geometry: LinkGeometry,
}

/// Link geometry keyed by link id, invalidated when either endpoint node's
/// geometry version moves.
#[derive(Default)]
pub struct LinkGeometryCache {
    entries: HashMap<LinkId, CachedGeometry>,
    hits: u64,
    misses: u64,
}

impl LinkGeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, link: &Link, from: &Node, to: &Node) -> &LinkGeometry {
        let fresh = self.entries.get(&link.id).is_some_and(|entry| {
            &entry.from == from.id()
                && &entry.to == to.id()
                && entry.from_version == from.geometry_version()
                && entry.to_version == to.geometry_version()
        });
        if fresh {
            self.hits += 1;
        } else {
            self.misses += 1;
            self.entries.insert(
                link.id.clone(),
                CachedGeometry {
                    from: from.id().clone(),
                    to: to.id().clone(),
                    from_version: from.geometry_version(),
                    to_version: to.geometry_version(),
                    geometry: LinkGeometry::for_link(link, from, to),
                },
            );
        }
        // Inserted above when missing.
        &self.entries[&link.id].geometry
    }

    pub fn invalidate(&mut self, id: &LinkId) {
        self.entries.remove(id);
    }

    /// Drop entries for links that no longer exist.
    pub fn retain(&mut self, mut live: impl FnMut(&LinkId) -> bool) {
        self.entries.retain(|id, _| live(id));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataType, NodeKind};

    #[test]
    fn control_offset_is_clamped() {
        let (cp1, _) = control_points(Point::ORIGIN, Point::new(10.0, 0.0));
        assert_eq!(cp1.x, MIN_CONTROL_OFFSET);
        let (cp1, cp2) = control_points(Point::ORIGIN, Point::new(1000.0, 0.0));
        assert_eq!(cp1.x, MAX_CONTROL_OFFSET);
        assert_eq!(cp2.x, 1000.0 - MAX_CONTROL_OFFSET);
    }

    #[test]
    fn segment_distance_clamps_projection() {
        let a = Point::ORIGIN;
        let b = Point::new(10.0, 0.0);
        assert_eq!(point_segment_distance(Point::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(point_segment_distance(Point::new(-4.0, 3.0), a, b), 5.0);
        assert_eq!(point_segment_distance(Point::new(1.0, 1.0), a, a), 2f32.sqrt());
    }

    #[test]
    fn degenerate_paths_do_not_fail() {
        assert_eq!(point_at_distance(&[], 1.0), None);
        let p = Point::new(3.0, 4.0);
        assert_eq!(point_at_distance(&[p], 10.0), Some(p));
        assert_eq!(point_at_distance(&[p, p], 1.0), Some(p));
        assert_eq!(path_length(&[p]), 0.0);
        assert!(!path_contains(&[], p, 1.0));
        let zero = LinkGeometry::new(p, p);
        assert!(zero.path_length().is_finite());
        assert!(zero.point_at_distance(5.0).is_some());
    }

    #[test]
    fn cache_recomputes_after_node_moves() {
        let mut a = Node::new("a", NodeKind::Filter, Point::ORIGIN).with_output(
            "out",
            DataType::Any,
            "Out",
        );
        let b = Node::new("b", NodeKind::Filter, Point::new(400.0, 0.0)).with_input(
            "in",
            DataType::Any,
            "In",
            false,
        );
        let link = Link::new("a", "out", "b", "in");
        let mut cache = LinkGeometryCache::new();

        let first = cache.get(&link, &a, &b).start;
        cache.get(&link, &a, &b);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));

        a.set_position(Point::new(0.0, 100.0));
        let moved = cache.get(&link, &a, &b).start;
        assert_eq!(cache.misses(), 2);
        assert_eq!(moved.y - first.y, 100.0);
    }

    #[test]
    fn generated_ids_are_prefixed() {
        let link = Link::new("a", "out", "b", "in");
        assert!(link.id.as_str().starts_with("link-"));
    }
}
