//! Planar Voronoi diagrams over integer grid sites.
//!
//! The diagram is computed as the dual of an exact-predicate Delaunay
//! triangulation. Cells of sites on the convex hull are unbounded and
//! reported as such; callers that need every cell closed surround their
//! sites with a ring of sentinel points.
//!
//! # Example
//!
//! ```
//! use planar_voronoi::{compute, GridPoint};
//!
//! let points: Vec<GridPoint> = (0..3)
//!     .flat_map(|i| (0..3).map(move |j| GridPoint::new(i * 10, j * 10)))
//!     .collect();
//!
//! let output = compute(&points).expect("computation should succeed");
//! assert_eq!(output.diagram.num_cells(), 9);
//! // Only the centre site has a closed cell.
//! assert!(output.diagram.cells[4].is_bounded_polygon());
//! ```

mod diagram;
mod error;
mod types;

pub(crate) mod delaunay;

pub use diagram::{CellView, PlanarVoronoi, VoronoiCell};
pub use error::VoronoiError;
pub use types::{GridPoint, MAX_COORD};

/// Output from Voronoi computation, including diagram and diagnostics.
#[derive(Debug, Clone)]
pub struct VoronoiOutput {
    /// The computed Voronoi diagram.
    pub diagram: PlanarVoronoi,
    /// Diagnostic information about the computation.
    pub diagnostics: VoronoiDiagnostics,
}

/// Diagnostic information from Voronoi computation.
#[derive(Debug, Clone, Default)]
pub struct VoronoiDiagnostics {
    /// Cells extending to infinity (sites on the convex hull).
    pub unbounded_cells: Vec<usize>,
    /// Bounded cells left with fewer than 3 vertices after welding.
    pub degenerate_cells: Vec<usize>,
    /// `(site, earlier_site)` pairs for coincident inputs. The later site
    /// gets an empty cell.
    pub duplicate_generators: Vec<(usize, usize)>,
}

impl VoronoiDiagnostics {
    /// Returns true if every cell is a closed polygon.
    pub fn is_clean(&self) -> bool {
        self.unbounded_cells.is_empty()
            && self.degenerate_cells.is_empty()
            && self.duplicate_generators.is_empty()
    }
}

/// Configuration for Voronoi computation.
#[derive(Debug, Clone)]
pub struct VoronoiConfig {
    /// Consecutive cell vertices closer than this are merged.
    pub weld_distance: f64,
}

impl Default for VoronoiConfig {
    fn default() -> Self {
        Self {
            weld_distance: 1e-6,
        }
    }
}

/// Compute a planar Voronoi diagram with default settings.
///
/// Returns a diagram plus diagnostics. Errors are reserved for invalid inputs
/// (too few points, coordinates out of range) or point-location failure.
pub fn compute(points: &[GridPoint]) -> Result<VoronoiOutput, VoronoiError> {
    compute_with(points, VoronoiConfig::default())
}

/// Compute a planar Voronoi diagram with explicit configuration.
pub fn compute_with(
    points: &[GridPoint],
    config: VoronoiConfig,
) -> Result<VoronoiOutput, VoronoiError> {
    if points.len() < 3 {
        return Err(VoronoiError::InsufficientPoints(points.len()));
    }
    if let Some((index, p)) = points.iter().enumerate().find(|(_, p)| !p.in_range()) {
        return Err(VoronoiError::CoordinateOutOfRange {
            index,
            x: p.x,
            y: p.y,
        });
    }

    let triangulation = delaunay::Triangulation::build(points)?;
    let diagram = PlanarVoronoi::from_triangulation(&triangulation, config.weld_distance);

    let mut diagnostics = VoronoiDiagnostics::default();
    for (i, cell) in diagram.cells.iter().enumerate() {
        if let Some(original) = triangulation.duplicate_of(i) {
            diagnostics.duplicate_generators.push((i, original as usize));
        } else if cell.unbounded {
            diagnostics.unbounded_cells.push(i);
        } else if cell.len() < 3 {
            diagnostics.degenerate_cells.push(i);
        }
    }

    Ok(VoronoiOutput {
        diagram,
        diagnostics,
    })
}
