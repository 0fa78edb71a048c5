//! Incremental Bowyer-Watson Delaunay triangulation over integer sites.
//!
//! Triangles are stored with counter-clockwise vertices and, for each vertex
//! slot `k`, the neighbouring triangle across the edge opposite that vertex.
//! Three super-triangle vertices are appended after the input sites so every
//! insertion lands inside an existing triangle.

mod hilbert;
pub(crate) mod predicates;

use rustc_hash::FxHashMap;

use crate::{GridPoint, VoronoiError};
use predicates::{incircle, orient2d, Sign};

pub(crate) use hilbert::hilbert_order;

/// Sentinel for "no triangle" / "no vertex".
pub(crate) const NONE: u32 = u32::MAX;

/// Super-triangle size as a multiple of the input bounding-box extent.
const SUPER_SCALE: i64 = 16;

/// Walk steps allowed before falling back to a linear scan.
const MAX_WALK_STEPS: usize = 1 << 16;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Triangle {
    pub v: [u32; 3],
    pub n: [u32; 3],
}

impl Triangle {
    #[inline]
    pub fn slot_of(&self, vertex: u32) -> Option<usize> {
        self.v.iter().position(|&v| v == vertex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Located {
    Inside(u32),
    Duplicate(u32),
}

/// A Delaunay triangulation of `n` sites plus three super vertices.
#[derive(Debug)]
pub(crate) struct Triangulation {
    /// Input sites followed by the three super-triangle vertices.
    points: Vec<GridPoint>,
    num_sites: usize,
    triangles: Vec<Triangle>,
    alive: Vec<bool>,
    free: Vec<u32>,
    /// One live triangle incident to each vertex (`NONE` until inserted).
    vertex_tri: Vec<u32>,
    /// For each site, the earlier site it coincides with.
    duplicate_of: Vec<u32>,
    last: u32,
    // Scratch reused across insertions.
    cavity_mark: Vec<u32>,
    epoch: u32,
}

impl Triangulation {
    /// Triangulate `sites`, inserting them along a Hilbert curve.
    pub fn build(sites: &[GridPoint]) -> Result<Self, VoronoiError> {
        let mut tri = Self::with_super_triangle(sites);
        for idx in hilbert_order(sites) {
            tri.insert(idx as u32)?;
        }
        Ok(tri)
    }

    fn with_super_triangle(sites: &[GridPoint]) -> Self {
        let (mut min_x, mut min_y) = (i64::MAX, i64::MAX);
        let (mut max_x, mut max_y) = (i64::MIN, i64::MIN);
        for p in sites {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let cx = (min_x + max_x) / 2;
        let cy = (min_y + max_y) / 2;
        let d = (max_x - min_x).max(max_y - min_y).max(1);

        let mut points = sites.to_vec();
        points.push(GridPoint::new(cx - SUPER_SCALE * d, cy - SUPER_SCALE / 2 * d));
        points.push(GridPoint::new(cx + SUPER_SCALE * d, cy - SUPER_SCALE / 2 * d));
        points.push(GridPoint::new(cx, cy + SUPER_SCALE * d));

        let n = sites.len() as u32;
        let root = Triangle {
            v: [n, n + 1, n + 2],
            n: [NONE; 3],
        };

        let mut vertex_tri = vec![NONE; points.len()];
        vertex_tri[n as usize] = 0;
        vertex_tri[n as usize + 1] = 0;
        vertex_tri[n as usize + 2] = 0;

        Self {
            points,
            num_sites: sites.len(),
            triangles: vec![root],
            alive: vec![true],
            free: Vec::new(),
            vertex_tri,
            duplicate_of: vec![NONE; sites.len()],
            last: 0,
            cavity_mark: vec![0],
            epoch: 0,
        }
    }

    #[inline]
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    #[inline]
    pub fn point(&self, idx: u32) -> GridPoint {
        self.points[idx as usize]
    }

    #[inline]
    pub fn is_super(&self, vertex: u32) -> bool {
        vertex as usize >= self.num_sites
    }

    #[inline]
    pub fn triangle(&self, t: u32) -> &Triangle {
        &self.triangles[t as usize]
    }

    #[inline]
    pub fn vertex_triangle(&self, vertex: u32) -> u32 {
        self.vertex_tri[vertex as usize]
    }

    #[inline]
    pub fn duplicate_of(&self, site: usize) -> Option<u32> {
        let d = self.duplicate_of[site];
        (d != NONE).then_some(d)
    }

    /// Indices of live triangles.
    pub fn live_triangles(&self) -> impl Iterator<Item = u32> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, &a)| a)
            .map(|(i, _)| i as u32)
    }

    pub fn touches_super(&self, t: u32) -> bool {
        self.triangles[t as usize].v.iter().any(|&v| self.is_super(v))
    }

    fn insert(&mut self, site: u32) -> Result<(), VoronoiError> {
        let p = self.points[site as usize];
        let start = match self.locate(p) {
            Some(Located::Inside(t)) => t,
            Some(Located::Duplicate(existing)) => {
                self.duplicate_of[site as usize] = existing;
                return Ok(());
            }
            None => return Err(VoronoiError::LocationFailed(site as usize)),
        };

        // Grow the cavity: every triangle whose circumcircle strictly contains p.
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.cavity_mark.iter_mut().for_each(|m| *m = 0);
            self.epoch = 1;
        }
        let epoch = self.epoch;
        self.cavity_mark[start as usize] = epoch;

        let mut stack = vec![start];
        let mut cavity = Vec::new();
        // Boundary edges (a, b) counter-clockwise around the cavity, with the
        // outside triangle across each edge.
        let mut boundary: Vec<(u32, u32, u32)> = Vec::new();

        while let Some(t) = stack.pop() {
            cavity.push(t);
            let tri = self.triangles[t as usize];
            for k in 0..3 {
                let a = tri.v[(k + 1) % 3];
                let b = tri.v[(k + 2) % 3];
                let nb = tri.n[k];
                if nb != NONE && self.cavity_mark[nb as usize] == epoch {
                    continue;
                }
                if nb != NONE && self.in_circumcircle(nb, p) {
                    self.cavity_mark[nb as usize] = epoch;
                    stack.push(nb);
                } else {
                    boundary.push((a, b, nb));
                }
            }
        }

        for &t in &cavity {
            self.alive[t as usize] = false;
            self.free.push(t);
        }

        // Fan new triangles (a, b, site) from the cavity boundary.
        let mut by_first: FxHashMap<u32, u32> = FxHashMap::default();
        let mut by_second: FxHashMap<u32, u32> = FxHashMap::default();
        let mut created = Vec::with_capacity(boundary.len());
        for &(a, b, outer) in &boundary {
            let t = self.alloc(Triangle {
                v: [a, b, site],
                n: [NONE, NONE, outer],
            });
            if outer != NONE {
                self.relink(outer, a, b, t);
            }
            by_first.insert(a, t);
            by_second.insert(b, t);
            created.push(t);
        }

        for &t in &created {
            let [a, b, _] = self.triangles[t as usize].v;
            // Across (b, site) is the new triangle starting at b; across
            // (site, a) is the new triangle ending at a.
            let across_b = by_first.get(&b).copied().unwrap_or(NONE);
            let across_a = by_second.get(&a).copied().unwrap_or(NONE);
            let tri = &mut self.triangles[t as usize];
            tri.n[0] = across_b;
            tri.n[1] = across_a;
            self.vertex_tri[a as usize] = t;
            self.vertex_tri[b as usize] = t;
            self.vertex_tri[site as usize] = t;
        }

        if let Some(&t) = created.last() {
            self.last = t;
        }
        Ok(())
    }

    fn alloc(&mut self, tri: Triangle) -> u32 {
        if let Some(t) = self.free.pop() {
            self.triangles[t as usize] = tri;
            self.alive[t as usize] = true;
            t
        } else {
            self.triangles.push(tri);
            self.alive.push(true);
            self.cavity_mark.push(0);
            (self.triangles.len() - 1) as u32
        }
    }

    /// Point `outer`'s neighbour slot for edge (b, a) at `t`.
    fn relink(&mut self, outer: u32, a: u32, b: u32, t: u32) {
        let tri = &mut self.triangles[outer as usize];
        for k in 0..3 {
            if tri.v[(k + 1) % 3] == b && tri.v[(k + 2) % 3] == a {
                tri.n[k] = t;
                return;
            }
        }
    }

    fn in_circumcircle(&self, t: u32, p: GridPoint) -> bool {
        let [a, b, c] = self.triangles[t as usize].v;
        incircle(self.point(a), self.point(b), self.point(c), p) == Sign::Pos
    }

    fn locate(&self, p: GridPoint) -> Option<Located> {
        let mut t = self.last;
        if !self.alive[t as usize] {
            t = self.live_triangles().next()?;
        }

        let mut steps = 0usize;
        'walk: while steps < MAX_WALK_STEPS {
            steps += 1;
            let tri = self.triangles[t as usize];
            // Rotate the starting edge to avoid pathological revisits.
            for i in 0..3 {
                let k = (i + steps) % 3;
                let a = self.point(tri.v[(k + 1) % 3]);
                let b = self.point(tri.v[(k + 2) % 3]);
                if orient2d(a, b, p) == Sign::Neg {
                    let next = tri.n[k];
                    if next == NONE {
                        return None;
                    }
                    t = next;
                    continue 'walk;
                }
            }
            return Some(self.classify(t, p));
        }

        // Linear fallback.
        self.live_triangles()
            .find(|&t| {
                let [a, b, c] = self.triangles[t as usize].v;
                let (a, b, c) = (self.point(a), self.point(b), self.point(c));
                orient2d(a, b, p) != Sign::Neg
                    && orient2d(b, c, p) != Sign::Neg
                    && orient2d(c, a, p) != Sign::Neg
            })
            .map(|t| self.classify(t, p))
    }

    fn classify(&self, t: u32, p: GridPoint) -> Located {
        match self.triangles[t as usize]
            .v
            .iter()
            .find(|&&v| self.point(v) == p)
        {
            Some(&v) => Located::Duplicate(v),
            None => Located::Inside(t),
        }
    }
}
