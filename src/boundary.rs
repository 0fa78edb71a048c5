//! Reference-boundary providers.

use std::path::Path;

use geo::MultiPolygon;
use serde_json::Value;

use crate::region::{RegionCatalog, RegionCode};
use crate::storage::geojson;
use crate::{Error, Result};

/// Supplies the reference geometry used to clip each region's cells.
pub trait BoundaryProvider: Send + Sync {
    /// Every geometry registered for `region`.
    fn candidates(&self, region: &RegionCode) -> Result<Vec<MultiPolygon<f64>>>;

    /// Exactly one geometry for `region`, or
    /// [`Error::MissingReferenceBoundary`] / [`Error::AmbiguousReferenceBoundary`].
    fn get_reference_boundary(&self, region: &RegionCode) -> Result<MultiPolygon<f64>> {
        let mut found = self.candidates(region)?;
        match found.len() {
            0 => Err(Error::MissingReferenceBoundary(region.to_string())),
            1 => Ok(found.remove(0)),
            count => Err(Error::AmbiguousReferenceBoundary {
                region: region.to_string(),
                count,
            }),
        }
    }
}

/// Boundaries held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBoundaries {
    entries: Vec<(RegionCode, MultiPolygon<f64>)>,
}

impl InMemoryBoundaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region: RegionCode, geometry: MultiPolygon<f64>) {
        self.entries.push((region, geometry));
    }

    pub fn with(mut self, region: impl Into<RegionCode>, geometry: MultiPolygon<f64>) -> Self {
        self.insert(region.into(), geometry);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BoundaryProvider for InMemoryBoundaries {
    fn candidates(&self, region: &RegionCode) -> Result<Vec<MultiPolygon<f64>>> {
        Ok(self
            .entries
            .iter()
            .filter(|(code, _)| code == region)
            .map(|(_, g)| g.clone())
            .collect())
    }
}

/// Boundaries read from a GeoJSON FeatureCollection.
///
/// A feature's region is its `code` property, or its `NAME` property looked
/// up in the region catalog. Features matching neither are ignored.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonBoundaries {
    inner: InMemoryBoundaries,
}

impl GeoJsonBoundaries {
    pub fn load(path: &Path, catalog: &RegionCatalog) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_value(&value, &path.display().to_string(), catalog)
    }

    pub fn from_value(value: &Value, origin: &str, catalog: &RegionCatalog) -> Result<Self> {
        let mut inner = InMemoryBoundaries::new();
        for (geometry, properties) in geojson::features(value, origin)? {
            let code = properties
                .get("code")
                .and_then(Value::as_str)
                .map(RegionCode::from)
                .or_else(|| {
                    properties
                        .get("NAME")
                        .and_then(Value::as_str)
                        .and_then(|name| catalog.code_for_name(name).cloned())
                });
            match (code, geometry) {
                (Some(code), Some(geometry)) if catalog.contains(&code) => inner.insert(code, geometry),
                (code, _) => log::debug!("{}: ignoring feature (region {:?})", origin, code),
            }
        }
        log::info!("Loaded {} region boundaries from {}", inner.len(), origin);
        Ok(Self { inner })
    }
}

impl BoundaryProvider for GeoJsonBoundaries {
    fn candidates(&self, region: &RegionCode) -> Result<Vec<MultiPolygon<f64>>> {
        self.inner.candidates(region)
    }
}
