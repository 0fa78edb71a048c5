//! Splits the national feed into per-region site tables.
//!
//! Each postcode belongs to exactly one region: the first region it is seen
//! in. Later records for the same code from another region are dropped and
//! listed as conflicts rather than merged.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{GridPoint, RawRecord, SiteTable};
use crate::constants::{NATIONAL_GRID_MAX_E, NATIONAL_GRID_MAX_N, PROGRESS_INTERVAL};
use crate::postcode::{Normalized, Normalizer, PostalCode};
use crate::region::{RegionCatalog, RegionCode};
use crate::util::Progress;
use crate::Error;

/// Record counts by ingestion outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub records: usize,
    pub accepted: usize,
    pub empty: usize,
    pub reserved: usize,
    pub terminated: usize,
    pub filtered_out: usize,
    pub malformed: usize,
    pub missing_coordinate: usize,
    /// Coordinates outside the configured grid extent.
    pub out_of_extent: usize,
    pub unknown_region: usize,
    pub cross_region: usize,
}

/// Inclusive bounds on accepted grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridExtent {
    pub min_e: i64,
    pub min_n: i64,
    pub max_e: i64,
    pub max_n: i64,
}

impl Default for GridExtent {
    fn default() -> Self {
        Self {
            min_e: 0,
            min_n: 0,
            max_e: NATIONAL_GRID_MAX_E,
            max_n: NATIONAL_GRID_MAX_N,
        }
    }
}

impl GridExtent {
    pub fn contains(&self, p: GridPoint) -> bool {
        (self.min_e..=self.max_e).contains(&p.x) && (self.min_n..=self.max_n).contains(&p.y)
    }

    /// Largest absolute coordinate inside the extent.
    pub fn max_abs(&self) -> i64 {
        [self.min_e, self.min_n, self.max_e, self.max_n]
            .into_iter()
            .map(i64::abs)
            .max()
            .unwrap_or(0)
    }
}

/// A postcode seen in a region other than the one that owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RegionConflict {
    pub postcode: String,
    pub kept_region: RegionCode,
    pub dropped_region: RegionCode,
}

/// Ingestion result: one site table per region plus bookkeeping.
#[derive(Debug, Default)]
pub struct Partitions {
    pub regions: BTreeMap<RegionCode, SiteTable>,
    pub stats: IngestStats,
    pub conflicts: Vec<RegionConflict>,
}

impl Partitions {
    pub fn site_count(&self) -> usize {
        self.regions.values().map(SiteTable::len).sum()
    }
}

pub struct Partitioner {
    catalog: RegionCatalog,
    normalizer: Normalizer,
    extent: GridExtent,
    owner: FxHashMap<PostalCode, RegionCode>,
    regions: BTreeMap<RegionCode, SiteTable>,
    stats: IngestStats,
    conflicts: BTreeSet<RegionConflict>,
    progress: Progress,
}

impl Partitioner {
    pub fn new(catalog: RegionCatalog, normalizer: Normalizer) -> Self {
        Self {
            catalog,
            normalizer,
            extent: GridExtent::default(),
            owner: FxHashMap::default(),
            regions: BTreeMap::new(),
            stats: IngestStats::default(),
            conflicts: BTreeSet::new(),
            progress: Progress::new("Ingestion", PROGRESS_INTERVAL),
        }
    }

    /// Reject coordinates outside `extent` instead of the national grid.
    pub fn with_extent(mut self, extent: GridExtent) -> Self {
        self.extent = extent;
        self
    }

    /// Route one record to its region's site table, or count why not.
    pub fn push(&mut self, record: RawRecord) {
        self.stats.records += 1;
        self.progress.tick();

        let code = match self.normalizer.normalize(&record.postcode) {
            Ok(Normalized::Code(code)) => code,
            Ok(Normalized::Empty) => {
                self.stats.empty += 1;
                return;
            }
            Ok(Normalized::Reserved) => {
                self.stats.reserved += 1;
                return;
            }
            Ok(Normalized::Terminated) => {
                self.stats.terminated += 1;
                return;
            }
            Ok(Normalized::FilteredOut) => {
                self.stats.filtered_out += 1;
                return;
            }
            Err(e) => {
                log::warn!("skipping record {:?}: {}", record.property_reference, e);
                self.stats.malformed += 1;
                return;
            }
        };

        let Some(coordinate) = record.coordinate else {
            log::debug!("{} ({}) has no coordinate", code, record.property_reference);
            self.stats.missing_coordinate += 1;
            return;
        };
        if !self.extent.contains(coordinate) {
            log::warn!(
                "skipping {} ({}): coordinate {},{} is outside the grid extent",
                code,
                record.property_reference,
                coordinate.x,
                coordinate.y
            );
            self.stats.out_of_extent += 1;
            return;
        }

        let region = match self.catalog.parse(&record.region) {
            Ok(region) => region,
            Err(Error::UnknownRegion(r)) => {
                log::warn!("{}: unknown region {:?}", code, r);
                self.stats.unknown_region += 1;
                return;
            }
            Err(e) => {
                log::warn!("{}: {}", code, e);
                self.stats.unknown_region += 1;
                return;
            }
        };

        let owner = self.owner.entry(code.clone()).or_insert_with(|| region.clone());
        if *owner != region {
            let conflict = RegionConflict {
                postcode: code.to_string(),
                kept_region: owner.clone(),
                dropped_region: region,
            };
            if self.conflicts.insert(conflict) {
                log::warn!(
                    "{} appears in more than one region; keeping {}",
                    code,
                    owner
                );
            }
            self.stats.cross_region += 1;
            return;
        }

        self.regions
            .entry(region)
            .or_default()
            .add(coordinate, code, &record.property_reference);
        self.stats.accepted += 1;
    }

    /// Count a feed row that could not be read at all.
    pub fn skip_unreadable(&mut self, err: &Error) {
        self.stats.records += 1;
        self.stats.malformed += 1;
        self.progress.tick();
        log::warn!("skipping unreadable record: {}", err);
    }

    pub fn extend<I: IntoIterator<Item = RawRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn finish(self) -> Partitions {
        log::info!(
            "Ingested {} records: {} accepted into {} regions, {} malformed, {} out of extent, {} cross-region",
            self.stats.records,
            self.stats.accepted,
            self.regions.len(),
            self.stats.malformed,
            self.stats.out_of_extent,
            self.stats.cross_region
        );
        Partitions {
            regions: self.regions,
            stats: self.stats,
            conflicts: self.conflicts.into_iter().collect(),
        }
    }
}
