//! Coastline/region clipping and polygon repair.

use std::sync::atomic::{AtomicUsize, Ordering};

use geo::{BooleanOps, BoundingRect, Contains, Coord, Intersects, LineString, MultiPolygon, Polygon, Rect};
use serde::Serialize;

use super::projection::Projection;
use super::tessellation::Cell;
use super::validation::{ring_area, validate_multipolygon};
use super::guarded;
use crate::constants::MIN_RING_AREA;
use crate::Error;

/// The reference geometry of one region, in output coordinates.
#[derive(Debug)]
pub struct ReferenceBoundary {
    geometry: MultiPolygon<f64>,
    bbox: Option<Rect<f64>>,
    intersections: AtomicUsize,
}

impl ReferenceBoundary {
    pub fn new(geometry: MultiPolygon<f64>) -> Self {
        let bbox = geometry.bounding_rect();
        Self {
            geometry,
            bbox,
            intersections: AtomicUsize::new(0),
        }
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    /// Strict containment; the bounding rectangle is checked first.
    pub fn contains(&self, c: Coord<f64>) -> bool {
        let Some(bbox) = self.bbox else {
            return false;
        };
        let (min, max) = (bbox.min(), bbox.max());
        if c.x < min.x || c.x > max.x || c.y < min.y || c.y > max.y {
            return false;
        }
        self.geometry.0.iter().any(|p| p.contains(&c))
    }

    /// True when any vertex of `mp` lies outside the boundary (at sea).
    pub fn requires_clipping(&self, mp: &MultiPolygon<f64>) -> bool {
        mp.0.iter().any(|polygon| {
            std::iter::once(polygon.exterior())
                .chain(polygon.interiors().iter())
                .any(|ring| ring.0.iter().any(|&c| !self.contains(c)))
        })
    }

    /// Intersect with the boundary, counting invocations.
    pub fn intersect(&self, mp: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, String> {
        self.intersections.fetch_add(1, Ordering::Relaxed);
        guarded(|| mp.intersection(&self.geometry))
    }

    /// Number of intersections computed against this boundary.
    pub fn intersection_count(&self) -> usize {
        self.intersections.load(Ordering::Relaxed)
    }
}

/// Flags describing what happened to one polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClipFlags {
    /// Intersected with the reference boundary.
    pub clipped: bool,
    /// Clipping was needed but failed or came out empty; the unclipped
    /// geometry was kept.
    pub fell_back: bool,
    /// A repair pass ran.
    pub repaired: bool,
    /// Still invalid after repair; emitted best-effort.
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub geometry: MultiPolygon<f64>,
    pub flags: ClipFlags,
}

/// Projects and clips cells against one region's boundary.
pub struct RegionClipper<'a> {
    boundary: &'a ReferenceBoundary,
    projection: Projection,
}

impl<'a> RegionClipper<'a> {
    pub fn new(boundary: &'a ReferenceBoundary, projection: Projection) -> Self {
        Self {
            boundary,
            projection,
        }
    }

    /// Project a cell into output coordinates.
    pub fn project_cell(&self, cell: &Cell) -> MultiPolygon<f64> {
        let coords = self.projection.project_ring(&cell.ring);
        MultiPolygon::new(vec![Polygon::new(LineString::from(coords), Vec::new())])
    }

    /// Project, repair and (when any vertex is at sea) clip one cell.
    /// `inland` skips the sea test entirely.
    pub fn clip_cell(&self, cell: &Cell, inland: bool, label: &str) -> ClipOutcome {
        let mut flags = ClipFlags::default();
        let mut geometry = ensure_valid(self.project_cell(cell), label, &mut flags);

        if inland || !self.boundary.requires_clipping(&geometry) {
            return ClipOutcome { geometry, flags };
        }

        if !geometry.intersects(self.boundary.geometry()) {
            log::debug!("{}: cell lies outside its region boundary; keeping it unclipped", label);
            flags.fell_back = true;
            return ClipOutcome { geometry, flags };
        }

        match self.boundary.intersect(&geometry) {
            Ok(result) => {
                let cleaned = drop_degenerate_parts(result);
                if cleaned.0.is_empty() {
                    log::warn!("{}: clip produced no polygon; keeping unclipped cell", label);
                    flags.fell_back = true;
                } else {
                    flags.clipped = true;
                    geometry = ensure_valid(cleaned, label, &mut flags);
                }
            }
            Err(e) => {
                log::warn!("{}: clip failed ({}); keeping unclipped cell", label, e);
                flags.fell_back = true;
            }
        }
        ClipOutcome { geometry, flags }
    }
}

/// Validate, repairing when needed. Sets `repaired`/`degraded` in `flags`.
pub fn ensure_valid(geometry: MultiPolygon<f64>, label: &str, flags: &mut ClipFlags) -> MultiPolygon<f64> {
    let check = validate_multipolygon(&geometry);
    if check.is_valid() {
        return geometry;
    }
    log::debug!("{}: {}; repairing", label, check.summary());
    flags.repaired = true;
    match repair(&geometry) {
        Ok(fixed) => {
            let recheck = validate_multipolygon(&fixed);
            if recheck.is_valid() && !fixed.0.is_empty() {
                fixed
            } else {
                let err = Error::GeometryRepairFailure {
                    key: label.to_string(),
                    detail: recheck.summary(),
                };
                log::warn!("{}", err);
                flags.degraded = true;
                if fixed.0.is_empty() {
                    geometry
                } else {
                    fixed
                }
            }
        }
        Err(detail) => {
            log::warn!(
                "{}",
                Error::GeometryRepairFailure {
                    key: label.to_string(),
                    detail,
                }
            );
            flags.degraded = true;
            geometry
        }
    }
}

/// Remove non-finite and repeated coordinates; `None` if the ring collapses.
fn clean_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for &c in &ring.0 {
        if !c.x.is_finite() || !c.y.is_finite() {
            continue;
        }
        if coords.last() != Some(&c) {
            coords.push(c);
        }
    }
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return None;
    }
    coords.push(coords[0]);
    let ring = LineString::from(coords);
    (ring_area(&ring) > MIN_RING_AREA).then_some(ring)
}

/// Deterministic repair: clean rings, then resolve self-intersections with a
/// boolean self-union.
pub fn repair(mp: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, String> {
    let cleaned: Vec<Polygon<f64>> = mp
        .0
        .iter()
        .filter_map(|polygon| {
            let exterior = clean_ring(polygon.exterior())?;
            let interiors = polygon.interiors().iter().filter_map(clean_ring).collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect();
    let cleaned = MultiPolygon::new(cleaned);
    if validate_multipolygon(&cleaned).is_valid() {
        return Ok(cleaned);
    }
    let unioned = guarded(|| cleaned.union(&MultiPolygon::<f64>::new(Vec::new())))?;
    Ok(drop_degenerate_parts(unioned))
}

/// Drop polygons (and holes) that are not proper areas, e.g. slivers left
/// by a point- or line-degenerate intersection.
pub fn drop_degenerate_parts(mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    let proper = |ring: &LineString<f64>| ring.0.len() >= 4 && ring_area(ring) > MIN_RING_AREA;
    MultiPolygon::new(
        mp.0
            .into_iter()
            .filter(|p| proper(p.exterior()))
            .map(|p| {
                let (exterior, interiors) = p.into_inner();
                let interiors = interiors.into_iter().filter(|r| proper(r)).collect();
                Polygon::new(exterior, interiors)
            })
            .collect(),
    )
}
