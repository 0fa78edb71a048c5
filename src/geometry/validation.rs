//! Validity checks for output polygons.
//!
//! These functions check for the ring problems that reprojection, clipping
//! and union can introduce before a polygon is handed to storage.

use geo::{Area, Coord, LineString, MultiPolygon, Polygon};

use crate::constants::MIN_RING_AREA;

/// Identifies a ring: `(polygon index, ring index)`, ring 0 is the exterior.
pub type RingId = (usize, usize);

/// Results of validating a multipolygon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    /// Total number of polygons
    pub num_polygons: usize,
    /// Total number of rings (exterior + interior)
    pub num_rings: usize,
    /// Coordinates that are NaN or infinite
    pub non_finite_coords: usize,
    /// Rings with fewer than 4 coordinates (3 distinct + closing)
    pub short_rings: Vec<RingId>,
    /// Rings whose first and last coordinates differ
    pub unclosed_rings: Vec<RingId>,
    /// Rings with the same coordinate repeated consecutively
    pub repeated_vertex_rings: Vec<RingId>,
    /// Rings enclosing (almost) no area
    pub zero_area_rings: Vec<RingId>,
    /// Pairs of rings with crossing or overlapping edges (a ring may pair
    /// with itself)
    pub self_intersections: Vec<(RingId, RingId)>,
}

impl ValidationResult {
    /// Check if the geometry is valid (no hard errors).
    ///
    /// Repeated vertices are reported but tolerated.
    pub fn is_valid(&self) -> bool {
        self.non_finite_coords == 0
            && self.short_rings.is_empty()
            && self.unclosed_rings.is_empty()
            && self.zero_area_rings.is_empty()
            && self.self_intersections.is_empty()
    }

    /// Total number of hard issues found
    pub fn issue_count(&self) -> usize {
        self.non_finite_coords
            + self.short_rings.len()
            + self.unclosed_rings.len()
            + self.zero_area_rings.len()
            + self.self_intersections.len()
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!(
                "valid ({} polygons, {} rings)",
                self.num_polygons, self.num_rings
            );
        }
        let mut parts = Vec::new();
        if self.non_finite_coords > 0 {
            parts.push(format!("{} non-finite coords", self.non_finite_coords));
        }
        if !self.short_rings.is_empty() {
            parts.push(format!("{} short rings", self.short_rings.len()));
        }
        if !self.unclosed_rings.is_empty() {
            parts.push(format!("{} unclosed rings", self.unclosed_rings.len()));
        }
        if !self.zero_area_rings.is_empty() {
            parts.push(format!("{} zero-area rings", self.zero_area_rings.len()));
        }
        if !self.self_intersections.is_empty() {
            parts.push(format!("{} self-intersections", self.self_intersections.len()));
        }
        format!("invalid: {}", parts.join(", "))
    }
}

/// Area enclosed by `ring`, closed implicitly.
pub fn ring_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), Vec::new()).signed_area().abs()
}

pub fn validate_polygon(polygon: &Polygon<f64>) -> ValidationResult {
    validate_multipolygon(&MultiPolygon::new(vec![polygon.clone()]))
}

/// Validate every ring of a multipolygon.
pub fn validate_multipolygon(mp: &MultiPolygon<f64>) -> ValidationResult {
    let mut result = ValidationResult {
        num_polygons: mp.0.len(),
        ..Default::default()
    };

    let mut segments: Vec<Segment> = Vec::new();

    for (pi, polygon) in mp.0.iter().enumerate() {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
        for (ri, ring) in rings.enumerate() {
            result.num_rings += 1;
            let id = (pi, ri);
            let coords = &ring.0;

            let non_finite = coords
                .iter()
                .filter(|c| !c.x.is_finite() || !c.y.is_finite())
                .count();
            if non_finite > 0 {
                result.non_finite_coords += non_finite;
                continue;
            }

            if coords.len() < 4 {
                result.short_rings.push(id);
                continue;
            }
            if coords.first() != coords.last() {
                result.unclosed_rings.push(id);
            }
            if coords.windows(2).any(|w| w[0] == w[1]) {
                result.repeated_vertex_rings.push(id);
            }
            if ring_area(ring) <= MIN_RING_AREA {
                result.zero_area_rings.push(id);
                continue;
            }
            collect_segments(ring, id, &mut segments);
        }
    }

    result.self_intersections = find_intersections(segments);
    result
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    ring: RingId,
    /// Position within the ring and ring edge count, for adjacency.
    pos: usize,
    ring_len: usize,
    a: Coord<f64>,
    b: Coord<f64>,
    min_x: f64,
    max_x: f64,
}

fn collect_segments(ring: &LineString<f64>, id: RingId, out: &mut Vec<Segment>) {
    // Skip zero-length edges from repeated vertices.
    let edges: Vec<(Coord<f64>, Coord<f64>)> = ring
        .0
        .windows(2)
        .filter(|w| w[0] != w[1])
        .map(|w| (w[0], w[1]))
        .collect();
    let ring_len = edges.len();
    for (pos, (a, b)) in edges.into_iter().enumerate() {
        out.push(Segment {
            ring: id,
            pos,
            ring_len,
            a,
            b,
            min_x: a.x.min(b.x),
            max_x: a.x.max(b.x),
        });
    }
}

fn adjacent(s: &Segment, t: &Segment) -> bool {
    if s.ring != t.ring {
        return false;
    }
    let diff = s.pos.abs_diff(t.pos);
    diff == 1 || diff + 1 == s.ring_len
}

/// Sweep over segments sorted by x, reporting each intersecting ring pair
/// once.
fn find_intersections(mut segments: Vec<Segment>) -> Vec<(RingId, RingId)> {
    segments.sort_by(|a, b| a.min_x.total_cmp(&b.min_x));
    let mut found: Vec<(RingId, RingId)> = Vec::new();
    for i in 0..segments.len() {
        let s = &segments[i];
        for t in &segments[i + 1..] {
            if t.min_x > s.max_x {
                break;
            }
            if adjacent(s, t) {
                continue;
            }
            if segments_cross(s.a, s.b, t.a, t.b) {
                let pair = if s.ring <= t.ring {
                    (s.ring, t.ring)
                } else {
                    (t.ring, s.ring)
                };
                if !found.contains(&pair) {
                    found.push(pair);
                }
            }
        }
    }
    found.sort_unstable();
    found
}

fn orient(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Proper crossings and collinear overlaps. Touching at a single point is
/// allowed.
fn segments_cross(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>, d: Coord<f64>) -> bool {
    let d1 = orient(c, d, a);
    let d2 = orient(c, d, b);
    let d3 = orient(a, b, c);
    let d4 = orient(a, b, d);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    if d1 == 0.0 && d2 == 0.0 && d3 == 0.0 && d4 == 0.0 {
        // Collinear: overlapping by more than a point?
        let (lo, hi) = if (b.x - a.x).abs() >= (b.y - a.y).abs() {
            (
                a.x.min(b.x).max(c.x.min(d.x)),
                a.x.max(b.x).min(c.x.max(d.x)),
            )
        } else {
            (
                a.y.min(b.y).max(c.y.min(d.y)),
                a.y.max(b.y).min(c.y.max(d.y)),
            )
        };
        return hi > lo;
    }

    // A vertex lying in the interior of the other segment.
    let interior = |p: Coord<f64>, s0: Coord<f64>, s1: Coord<f64>| p != s0 && p != s1 && on_segment(s0, s1, p);
    (d1 == 0.0 && interior(a, c, d))
        || (d2 == 0.0 && interior(b, c, d))
        || (d3 == 0.0 && interior(c, a, b))
        || (d4 == 0.0 && interior(d, a, b))
}
