//! Per-region Voronoi tessellation with an enclosing infinity ring.
//!
//! Real sites come first in the engine's input, followed by synthetic ring
//! sites. Only real sites' cells are returned; ring sites exist solely to
//! close the cells of sites near the region's edge.

use std::fmt;

use glam::DVec2;
use planar_voronoi::{compute_with, GridPoint, VoronoiConfig, MAX_COORD};
use serde::{Deserialize, Serialize};

use crate::constants::{
    CENTRE_OF_GB_E, CENTRE_OF_GB_N, DEFAULT_WELD_DISTANCE, INFINITY_RING_MARGIN,
    INFINITY_RING_POINTS, INFINITY_RING_RADIUS_FACTOR, NATIONAL_MAX_N, NATIONAL_MIN_N,
};
use crate::Result;

/// Synthetic sites placed evenly on a circle around the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfinityRing {
    /// Ring centre in grid coordinates.
    pub centre: [f64; 2],
    pub radius: f64,
    /// Number of ring sites; 0 disables the ring.
    pub points: usize,
}

impl Default for InfinityRing {
    fn default() -> Self {
        Self {
            centre: [CENTRE_OF_GB_E, CENTRE_OF_GB_N],
            radius: INFINITY_RING_RADIUS_FACTOR * (NATIONAL_MAX_N - NATIONAL_MIN_N),
            points: INFINITY_RING_POINTS,
        }
    }
}

impl InfinityRing {
    pub fn disabled() -> Self {
        Self {
            points: 0,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.points > 0
    }

    /// Radius actually used for `sites`: the configured radius, or twice the
    /// farthest site distance when a site lies too close to the ring. Never
    /// larger than what keeps every ring site inside the engine's range.
    pub fn effective_radius(&self, sites: &[GridPoint]) -> f64 {
        let centre = DVec2::from(self.centre);
        let farthest = sites
            .iter()
            .map(|s| s.as_dvec2().distance(centre))
            .fold(0.0f64, f64::max);
        let wanted = if farthest > INFINITY_RING_MARGIN * self.radius {
            log::warn!(
                "site {:.0} m from ring centre exceeds {:.0}% of ring radius {:.0} m; enlarging ring",
                farthest,
                INFINITY_RING_MARGIN * 100.0,
                self.radius
            );
            2.0 * farthest
        } else {
            self.radius
        };

        let limit = self.max_radius();
        if wanted > limit {
            log::warn!(
                "ring radius {:.0} m clamped to {:.0} m; sites near the hull may lose their cells",
                wanted,
                limit
            );
            limit
        } else {
            wanted
        }
    }

    /// Largest radius whose ring sites all stay within `MAX_COORD`.
    pub fn max_radius(&self) -> f64 {
        let reach = self.centre[0].abs().max(self.centre[1].abs());
        (MAX_COORD as f64 - reach - 1.0).max(0.0)
    }

    /// Ring site coordinates for `sites`.
    pub fn sites_for(&self, sites: &[GridPoint]) -> Vec<GridPoint> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let radius = self.effective_radius(sites);
        let step = std::f64::consts::TAU / self.points as f64;
        (0..self.points)
            .map(|k| {
                let (sin, cos) = (k as f64 * step).sin_cos();
                GridPoint::new(
                    (self.centre[0] + radius * cos).round() as i64,
                    (self.centre[1] + radius * sin).round() as i64,
                )
            })
            .collect()
    }
}

/// Real sites plus ring sites, in engine input order.
#[derive(Debug, Clone)]
pub struct TessellationInput {
    points: Vec<GridPoint>,
    real: usize,
}

impl TessellationInput {
    pub fn new(sites: Vec<GridPoint>, ring: &InfinityRing) -> Self {
        let real = sites.len();
        let ring_sites = ring.sites_for(&sites);
        let mut points = sites;
        points.extend(ring_sites);
        Self { points, real }
    }

    pub fn real_count(&self) -> usize {
        self.real
    }

    pub fn ring_count(&self) -> usize {
        self.points.len() - self.real
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }
}

/// Why a site produced no cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DegenerateReason {
    /// The cell extends to infinity.
    Unbounded,
    /// Fewer than 3 distinct vertices.
    TooFewVertices(usize),
    /// Another site has the same coordinate.
    DuplicateSite,
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegenerateReason::Unbounded => write!(f, "cell is unbounded"),
            DegenerateReason::TooFewVertices(n) => write!(f, "cell has only {} vertices", n),
            DegenerateReason::DuplicateSite => write!(f, "site coincides with another site"),
        }
    }
}

/// A closed cell polygon in grid coordinates, counter-clockwise, not
/// repeated at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub site: usize,
    pub ring: Vec<DVec2>,
}

impl Cell {
    pub fn area(&self) -> f64 {
        let n = self.ring.len();
        (0..n)
            .map(|i| self.ring[i].perp_dot(self.ring[(i + 1) % n]))
            .sum::<f64>()
            * 0.5
    }
}

/// Cells for the real sites of one region.
#[derive(Debug, Clone)]
pub struct Tessellation {
    cells: Vec<Result<Cell, DegenerateReason>>,
    ring_sites: usize,
}

impl Tessellation {
    pub fn cells(&self) -> &[Result<Cell, DegenerateReason>] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<Result<Cell, DegenerateReason>> {
        self.cells
    }

    pub fn cell(&self, site: usize) -> Result<&Cell, DegenerateReason> {
        self.cells[site].as_ref().map_err(|r| *r)
    }

    pub fn ring_sites(&self) -> usize {
        self.ring_sites
    }

    pub fn degenerate_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_err()).count()
    }
}

/// Tessellate one region's sites.
pub fn tessellate(input: &TessellationInput, weld_distance: f64) -> Result<Tessellation> {
    let real = input.real_count();
    if input.points().len() < 3 {
        // Too few sites to bound anything.
        return Ok(Tessellation {
            cells: vec![Err(DegenerateReason::Unbounded); real],
            ring_sites: input.ring_count(),
        });
    }

    let config = VoronoiConfig {
        weld_distance: if weld_distance > 0.0 {
            weld_distance
        } else {
            DEFAULT_WELD_DISTANCE
        },
    };
    let output = compute_with(input.points(), config)?;
    let diagram = &output.diagram;
    log::debug!(
        "tessellated {} sites + {} ring sites: {} vertices, {} unbounded, {} degenerate",
        real,
        input.ring_count(),
        diagram.num_vertices(),
        output.diagnostics.unbounded_cells.len(),
        output.diagnostics.degenerate_cells.len()
    );

    let duplicates: Vec<usize> = output
        .diagnostics
        .duplicate_generators
        .iter()
        .map(|&(site, _)| site)
        .filter(|&site| site < real)
        .collect();

    let cells = (0..real)
        .map(|site| {
            let view = diagram.cell(site);
            if duplicates.contains(&site) {
                Err(DegenerateReason::DuplicateSite)
            } else if view.unbounded {
                Err(DegenerateReason::Unbounded)
            } else if view.len() < 3 {
                Err(DegenerateReason::TooFewVertices(view.len()))
            } else {
                Ok(Cell {
                    site,
                    ring: view.positions().collect(),
                })
            }
        })
        .collect();

    Ok(Tessellation {
        cells,
        ring_sites: input.ring_count(),
    })
}
