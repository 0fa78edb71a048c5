//! Optional "definitely inland" sector hints.
//!
//! A JSON object mapping region code to the postcode sectors whose cells
//! never reach the coast, e.g. `{"LN": ["E1 6", "E1 7"]}`. Purely a
//! performance hint: a listed sector skips the sea test.

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::region::RegionCode;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct InlandSectors {
    by_region: FxHashMap<RegionCode, FxHashSet<String>>,
}

impl InlandSectors {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: FxHashMap<String, Vec<String>> = serde_json::from_str(s)?;
        Ok(raw
            .into_iter()
            .flat_map(|(region, sectors)| {
                let region = RegionCode::new(region);
                sectors.into_iter().map(move |s| (region.clone(), s))
            })
            .collect())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        let hints = Self::from_json_str(&text)?;
        log::info!(
            "Loaded inland sector hints for {} regions ({} sectors)",
            hints.by_region.len(),
            hints.len()
        );
        Ok(hints)
    }

    pub fn insert(&mut self, region: RegionCode, sector: impl Into<String>) {
        self.by_region.entry(region).or_default().insert(sector.into());
    }

    pub fn is_inland(&self, region: &RegionCode, sector: &str) -> bool {
        self.by_region
            .get(region)
            .is_some_and(|sectors| sectors.contains(sector))
    }

    /// Sectors listed for one region, if any.
    pub fn for_region(&self, region: &RegionCode) -> Option<&FxHashSet<String>> {
        self.by_region.get(region)
    }

    pub fn len(&self) -> usize {
        self.by_region.values().map(FxHashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(RegionCode, String)> for InlandSectors {
    fn from_iter<I: IntoIterator<Item = (RegionCode, String)>>(iter: I) -> Self {
        let mut hints = Self::default();
        for (region, sector) in iter {
            hints.insert(region, sector);
        }
        hints
    }
}
