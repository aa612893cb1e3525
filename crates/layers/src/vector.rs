use earcutr::earcut;
use foundation::bounds::Aabb2;
use foundation::math::Vec2;

/// Zoom-0 pixel geometry a feature is hit-tested against.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HitOutline {
    /// Points and icons are picked by their anchor through the grid index.
    #[default]
    Anchor,
    /// `GL_LINES` vertex pairs.
    Segments(Vec<Vec2>),
    /// Triangle list with holes already cut out.
    Triangles { vertices: Vec<Vec2>, bounds: Aabb2 },
}

impl HitOutline {
    pub fn triangles(vertices: Vec<Vec2>) -> Self {
        let mut bounds = Aabb2::empty();
        for v in &vertices {
            bounds.extend(*v);
        }
        HitOutline::Triangles { vertices, bounds }
    }

    /// Pixel distance from `p` to a line, `0.0` inside a shape, `None` when
    /// `p` lies outside a shape or the outline is an anchor.
    pub fn distance(&self, p: Vec2) -> Option<f64> {
        match self {
            HitOutline::Anchor => None,
            HitOutline::Segments(pairs) => pairs
                .chunks_exact(2)
                .map(|pair| segment_distance(p, pair[0], pair[1]))
                .min_by(f64::total_cmp),
            HitOutline::Triangles { vertices, bounds } => {
                if bounds.is_empty() || !bounds.contains(p) {
                    return None;
                }
                vertices
                    .chunks_exact(3)
                    .any(|tri| triangle_contains(p, tri[0], tri[1], tri[2]))
                    .then_some(0.0)
            }
        }
    }
}

/// Distance from `p` to the segment `a-b`.
pub fn segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let denom = ab.dot(ab);
    if denom <= f64::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / denom).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Barycentric test, edges inclusive. Degenerate triangles contain nothing.
pub fn triangle_contains(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;
    let dot00 = v0.dot(v0);
    let dot01 = v0.dot(v1);
    let dot02 = v0.dot(v2);
    let dot11 = v1.dot(v1);
    let dot12 = v1.dot(v2);

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() <= f64::EPSILON * dot00 * dot11 {
        return false;
    }
    let u = (dot11 * dot02 - dot01 * dot12) / denom;
    let v = (dot00 * dot12 - dot01 * dot02) / denom;
    u >= 0.0 && v >= 0.0 && u + v <= 1.0
}

/// Expands polylines into `GL_LINES` vertex pairs: `a-b, b-c, ...`.
pub fn line_segments(lines: &[Vec<Vec2>]) -> Vec<Vec2> {
    let mut out = Vec::new();
    for line in lines {
        for pair in line.windows(2) {
            out.push(pair[0]);
            out.push(pair[1]);
        }
    }
    out
}

/// Triangulates one polygon (outer ring first, then holes) into a flat
/// triangle list, 3 vertices per triangle.
pub fn triangulate_polygon(rings: &[Vec<Vec2>]) -> Vec<Vec2> {
    let mut vertices: Vec<Vec2> = Vec::new();
    let mut coords: Vec<f64> = Vec::new();
    let mut hole_indices: Vec<usize> = Vec::new();

    for (ring_i, ring) in rings.iter().enumerate() {
        let ring = without_closing_duplicate(ring);
        if ring.len() < 3 {
            // A degenerate outer ring leaves nothing to fill.
            if ring_i == 0 {
                return Vec::new();
            }
            continue;
        }
        if ring_i > 0 {
            hole_indices.push(vertices.len());
        }
        for p in ring {
            coords.push(p.x);
            coords.push(p.y);
            vertices.push(*p);
        }
    }

    if vertices.len() < 3 {
        return Vec::new();
    }

    let indices = match earcut(&coords, &hole_indices, 2) {
        Ok(ix) => ix,
        Err(_) => return Vec::new(),
    };

    indices
        .into_iter()
        .filter_map(|idx| vertices.get(idx).copied())
        .collect()
}

fn without_closing_duplicate(ring: &[Vec2]) -> &[Vec2] {
    match ring {
        [first, .., last] if first.distance(*last) < 1e-9 => {
            &ring[..ring.len() - 1]
        }
        _ => ring,
    }
}

#[cfg(test)]
mod tests {
    use super::{HitOutline, line_segments, segment_distance, triangle_contains, triangulate_polygon};
    use foundation::math::Vec2;

    fn square(x: f64, y: f64, side: f64, closed: bool) -> Vec<Vec2> {
        let mut ring = vec![
            Vec2::new(x, y),
            Vec2::new(x + side, y),
            Vec2::new(x + side, y + side),
            Vec2::new(x, y + side),
        ];
        if closed {
            ring.push(Vec2::new(x, y));
        }
        ring
    }

    #[test]
    fn segments_pair_consecutive_vertices() {
        let line = vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)];
        let out = line_segments(&[line, vec![Vec2::new(5.0, 5.0)]]);
        assert_eq!(
            out,
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
            ]
        );
    }

    #[test]
    fn triangulates_closed_square() {
        let tris = triangulate_polygon(&[square(0.0, 0.0, 10.0, true)]);
        assert_eq!(tris.len(), 6);
        assert!(tris.iter().all(|v| v.x >= 0.0 && v.x <= 10.0));
    }

    #[test]
    fn holes_add_triangles() {
        let outer = square(0.0, 0.0, 10.0, true);
        let hole = square(4.0, 4.0, 2.0, true);
        let tris = triangulate_polygon(&[outer, hole]);
        assert!(tris.len() > 6);
        assert_eq!(tris.len() % 3, 0);
        // Nothing is emitted strictly inside the hole.
        assert!(!tris.iter().any(|v| v.x > 4.0 && v.x < 6.0 && v.y > 4.0 && v.y < 6.0));
    }

    #[test]
    fn degenerate_rings_yield_nothing() {
        assert!(triangulate_polygon(&[]).is_empty());
        assert!(triangulate_polygon(&[vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)]]).is_empty());
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(segment_distance(Vec2::new(5.0, 3.0), a, b), 3.0);
        assert_eq!(segment_distance(Vec2::new(-4.0, 3.0), a, b), 5.0);
        assert_eq!(segment_distance(Vec2::new(2.0, 2.0), a, a), Vec2::new(2.0, 2.0).length());
    }

    #[test]
    fn triangle_edges_are_inclusive() {
        let (a, b, c) = (Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(0.0, 4.0));
        assert!(triangle_contains(Vec2::new(1.0, 1.0), a, b, c));
        assert!(triangle_contains(Vec2::new(2.0, 0.0), a, b, c));
        assert!(!triangle_contains(Vec2::new(3.0, 3.0), a, b, c));
        assert!(!triangle_contains(Vec2::new(1.0, 1.0), a, b, Vec2::new(8.0, 0.0)));
    }

    #[test]
    fn outlines_measure_lines_and_cover_shapes_without_holes() {
        let line = HitOutline::Segments(line_segments(&[vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
        ]]));
        assert_eq!(line.distance(Vec2::new(12.0, 5.0)), Some(2.0));

        let shape = HitOutline::triangles(triangulate_polygon(&[
            square(0.0, 0.0, 10.0, true),
            square(4.0, 4.0, 2.0, true),
        ]));
        assert_eq!(shape.distance(Vec2::new(1.0, 8.5)), Some(0.0));
        assert_eq!(shape.distance(Vec2::new(5.0, 5.0)), None);
        assert_eq!(shape.distance(Vec2::new(20.0, 5.0)), None);
        assert_eq!(HitOutline::Anchor.distance(Vec2::new(0.0, 0.0)), None);
    }
}
