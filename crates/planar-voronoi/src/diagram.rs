use glam::DVec2;

use crate::delaunay::{Triangulation, NONE};
use crate::GridPoint;

/// A single Voronoi cell.
#[derive(Debug, Clone, PartialEq)]
pub struct VoronoiCell {
    /// Index of the generator site for this cell.
    pub generator_index: usize,
    /// Indices into the `vertices` array of [`PlanarVoronoi`], ordered
    /// counter-clockwise. Empty for unbounded cells and duplicate sites.
    pub vertex_indices: Vec<usize>,
    /// The cell extends to infinity (its site is on the hull).
    pub unbounded: bool,
}

impl VoronoiCell {
    #[inline]
    pub fn len(&self) -> usize {
        self.vertex_indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertex_indices.is_empty()
    }

    /// A closed, finite polygon with at least 3 vertices.
    #[inline]
    pub fn is_bounded_polygon(&self) -> bool {
        !self.unbounded && self.vertex_indices.len() >= 3
    }
}

/// Borrowed view of a cell together with its vertex positions.
#[derive(Debug, Clone, Copy)]
pub struct CellView<'a> {
    pub generator_index: usize,
    pub vertex_indices: &'a [usize],
    pub unbounded: bool,
    vertices: &'a [DVec2],
}

impl<'a> CellView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.vertex_indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertex_indices.is_empty()
    }

    /// Vertex positions in ring order (not closed).
    pub fn positions(&self) -> impl Iterator<Item = DVec2> + 'a {
        let vertices = self.vertices;
        self.vertex_indices.iter().map(move |&i| vertices[i])
    }

    /// Signed shoelace area; positive for counter-clockwise rings.
    pub fn signed_area(&self) -> f64 {
        let pts: Vec<DVec2> = self.positions().collect();
        if pts.len() < 3 {
            return 0.0;
        }
        let mut twice = 0.0;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            twice += a.perp_dot(b);
        }
        twice * 0.5
    }
}

/// A planar Voronoi diagram.
#[derive(Debug, Clone)]
pub struct PlanarVoronoi {
    /// The generator sites (input order).
    pub generators: Vec<GridPoint>,
    /// Voronoi vertices (circumcentres of Delaunay triangles).
    pub vertices: Vec<DVec2>,
    /// One cell per generator, in input order.
    pub cells: Vec<VoronoiCell>,
}

impl PlanarVoronoi {
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn cell(&self, idx: usize) -> CellView<'_> {
        let cell = &self.cells[idx];
        CellView {
            generator_index: cell.generator_index,
            vertex_indices: &cell.vertex_indices,
            unbounded: cell.unbounded,
            vertices: &self.vertices,
        }
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = CellView<'_>> + '_ {
        (0..self.cells.len()).map(move |i| self.cell(i))
    }

    /// Build the dual diagram of a finished triangulation.
    ///
    /// Each live triangle not touching the super triangle contributes its
    /// circumcentre as a vertex. A site's cell is the ring of circumcentres
    /// of its incident triangles, walked counter-clockwise.
    pub(crate) fn from_triangulation(tri: &Triangulation, weld_distance: f64) -> Self {
        let mut tri_vertex = vec![NONE; tri.live_triangles().last().map_or(0, |t| t as usize + 1)];
        let mut vertices = Vec::new();
        for t in tri.live_triangles() {
            if tri.touches_super(t) {
                continue;
            }
            let [a, b, c] = tri.triangle(t).v;
            tri_vertex[t as usize] = vertices.len() as u32;
            vertices.push(circumcenter(tri.point(a), tri.point(b), tri.point(c)));
        }

        let weld_sq = weld_distance * weld_distance;
        let cells = (0..tri.num_sites())
            .map(|site| {
                if tri.duplicate_of(site).is_some() {
                    return VoronoiCell {
                        generator_index: site,
                        vertex_indices: Vec::new(),
                        unbounded: false,
                    };
                }
                match ring_around(tri, site as u32, &tri_vertex) {
                    Some(ring) => VoronoiCell {
                        generator_index: site,
                        vertex_indices: weld_ring(ring, &vertices, weld_sq),
                        unbounded: false,
                    },
                    None => VoronoiCell {
                        generator_index: site,
                        vertex_indices: Vec::new(),
                        unbounded: true,
                    },
                }
            })
            .collect();

        PlanarVoronoi {
            generators: (0..tri.num_sites()).map(|i| tri.point(i as u32)).collect(),
            vertices,
            cells,
        }
    }
}

/// Collect circumcentre indices counter-clockwise around `site`.
/// Returns `None` when the rotation leaves the triangulation or reaches a
/// super-triangle vertex (the cell is unbounded).
fn ring_around(tri: &Triangulation, site: u32, tri_vertex: &[u32]) -> Option<Vec<usize>> {
    let start = tri.vertex_triangle(site);
    if start == NONE {
        return None;
    }
    let mut ring = Vec::new();
    let mut t = start;
    loop {
        let vi = tri_vertex.get(t as usize).copied().unwrap_or(NONE);
        if vi == NONE {
            return None;
        }
        ring.push(vi as usize);

        let tri_ref = tri.triangle(t);
        let k = tri_ref.slot_of(site)?;
        // The next triangle counter-clockwise shares edge (site, v[k + 2]),
        // which lies opposite v[k + 1].
        let next = tri_ref.n[(k + 1) % 3];
        if next == NONE {
            return None;
        }
        if next == start {
            return Some(ring);
        }
        if ring.len() > tri_vertex.len() {
            return None;
        }
        t = next;
    }
}

/// Drop vertices closer than the weld distance to their predecessor.
fn weld_ring(ring: Vec<usize>, vertices: &[DVec2], weld_sq: f64) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::with_capacity(ring.len());
    for vi in ring {
        if let Some(&prev) = out.last() {
            if vertices[prev].distance_squared(vertices[vi]) <= weld_sq {
                continue;
            }
        }
        out.push(vi);
    }
    while out.len() > 1 {
        let first = vertices[out[0]];
        let last = vertices[out[out.len() - 1]];
        if first.distance_squared(last) <= weld_sq {
            out.pop();
        } else {
            break;
        }
    }
    out
}

/// Circumcentre of triangle `a, b, c`, computed relative to `a`.
fn circumcenter(a: GridPoint, b: GridPoint, c: GridPoint) -> DVec2 {
    let bx = (b.x - a.x) as f64;
    let by = (b.y - a.y) as f64;
    let cx = (c.x - a.x) as f64;
    let cy = (c.y - a.y) as f64;
    let d = 2.0 * (bx * cy - by * cx);
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    DVec2::new(a.x as f64 + ux, a.y as f64 + uy)
}
