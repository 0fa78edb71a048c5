//! Pipeline configuration.

use std::path::Path;

use planar_voronoi::MAX_COORD;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WELD_DISTANCE, LABEL_BUDGET, LABEL_ELLIPSIS, LABEL_SEPARATOR, RESERVED_PREFIXES};
use crate::geometry::{InfinityRing, Projection};
use crate::ingest::GridExtent;
use crate::postcode::Normalizer;
use crate::region::RegionCatalog;
use crate::{Error, Result};

/// Every knob of a run. All fields have defaults, so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ring: InfinityRing,
    pub projection: Projection,
    /// Grid coordinates accepted at ingestion.
    pub extent: GridExtent,
    pub regions: RegionCatalog,
    pub reserved_prefixes: Vec<String>,
    /// Only keep codes starting with this prefix.
    pub startswith: Option<String>,
    /// Character budget for aggregate labels.
    pub label_budget: usize,
    /// Worker threads; 0 means one per available CPU.
    pub workers: usize,
    pub weld_distance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring: InfinityRing::default(),
            projection: Projection::default(),
            extent: GridExtent::default(),
            regions: RegionCatalog::default(),
            reserved_prefixes: RESERVED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            startswith: None,
            label_budget: LABEL_BUDGET,
            workers: 0,
            weld_distance: DEFAULT_WELD_DISTANCE,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(Error::Config("region catalog is empty".into()));
        }
        if self.ring.is_enabled() && !(self.ring.radius.is_finite() && self.ring.radius > 0.0) {
            return Err(Error::Config(format!(
                "infinity ring radius must be positive, got {}",
                self.ring.radius
            )));
        }
        if self.ring.is_enabled() && self.ring.points < 3 {
            return Err(Error::Config(format!(
                "infinity ring needs at least 3 points (or 0 to disable), got {}",
                self.ring.points
            )));
        }
        let extent = &self.extent;
        if extent.min_e > extent.max_e || extent.min_n > extent.max_n {
            return Err(Error::Config(format!("grid extent is empty: {:?}", extent)));
        }
        if extent.max_abs() > MAX_COORD {
            return Err(Error::Config(format!(
                "grid extent exceeds the tessellation range of +/-{}",
                MAX_COORD
            )));
        }
        let minimum = LABEL_ELLIPSIS.len() + LABEL_SEPARATOR.len();
        if self.label_budget < minimum {
            return Err(Error::Config(format!(
                "label budget must be at least {} characters",
                minimum
            )));
        }
        if !(self.weld_distance.is_finite() && self.weld_distance >= 0.0) {
            return Err(Error::Config(format!(
                "weld distance must be non-negative, got {}",
                self.weld_distance
            )));
        }
        Ok(())
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// A normalizer honouring the reserved prefixes and prefix filter.
    pub fn normalizer(&self, terminated: FxHashSet<String>) -> Normalizer {
        Normalizer::new()
            .with_reserved_prefixes(self.reserved_prefixes.iter().cloned())
            .with_terminated(terminated)
            .with_prefix_filter(self.startswith.clone())
    }
}
