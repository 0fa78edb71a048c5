//! The per-region work unit: tessellate, clip, and write unit and
//! vertical-street artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::MultiPolygon;
use rayon::prelude::*;
use serde_json::json;

use super::aggregate::merge_parts;
use super::executor::WorkUnit;
use super::report::UnitStats;
use super::vertical;
use crate::config::PipelineConfig;
use crate::geometry::{ensure_valid, tessellate, ClipFlags, ClipOutcome, ReferenceBoundary, RegionClipper, TessellationInput};
use crate::hints::InlandSectors;
use crate::ingest::Site;
use crate::postcode::PostalCode;
use crate::region::RegionCode;
use crate::storage::{ArtifactKey, Properties, StorageSink};
use crate::util::Timed;
use crate::{Error, Result};

/// All sites of one macro region and what is needed to turn them into
/// artifacts. Sites and cells are dropped when the unit finishes.
pub struct RegionUnit {
    region: RegionCode,
    sites: Vec<Site>,
    boundary: Arc<ReferenceBoundary>,
    config: Arc<PipelineConfig>,
    hints: Arc<InlandSectors>,
    sink: Arc<dyn StorageSink>,
}

impl RegionUnit {
    pub fn new(
        region: RegionCode,
        sites: Vec<Site>,
        boundary: Arc<ReferenceBoundary>,
        config: Arc<PipelineConfig>,
        hints: Arc<InlandSectors>,
        sink: Arc<dyn StorageSink>,
    ) -> Self {
        Self {
            region,
            sites,
            boundary,
            config,
            hints,
            sink,
        }
    }

    /// Keys this region produces when every cell is usable.
    pub fn expected_keys(&self) -> Vec<ArtifactKey> {
        let mut keys: Vec<ArtifactKey> = self
            .sites
            .iter()
            .filter_map(Site::single_code)
            .map(|code| ArtifactKey::unit(code.as_str()))
            .collect();
        keys.sort();
        keys.dedup();
        keys.extend(vertical::resolve(&self.sites).map(|street| street.key()));
        keys
    }

    /// A cell skips the sea test only when every code at its site lies in a
    /// sector known to be inland.
    fn is_inland(&self, site: &Site) -> bool {
        !site.postcodes.is_empty()
            && site
                .postcodes
                .iter()
                .all(|code| self.hints.is_inland(&self.region, code.sector()))
    }

    fn clip_cells(&self, stats: &mut UnitStats) -> Result<Vec<Option<ClipOutcome>>> {
        let points = self.sites.iter().map(|s| s.coordinate).collect();
        let input = TessellationInput::new(points, &self.config.ring);
        let tessellation = {
            let _t = Timed::debug(format!("{}: tessellating {} sites", self.region, input.real_count()));
            tessellate(&input, self.config.weld_distance)?
        };

        let _t = Timed::debug(format!("{}: clipping", self.region));
        let clipper = RegionClipper::new(&self.boundary, self.config.projection);
        let outcomes: Vec<Option<ClipOutcome>> = tessellation
            .cells()
            .par_iter()
            .zip(self.sites.par_iter())
            .enumerate()
            .map(|(index, (cell, site))| match cell {
                Ok(cell) => Some(clipper.clip_cell(cell, self.is_inland(site), &site_label(site))),
                Err(reason) => {
                    log::debug!(
                        "{}: {}",
                        self.region,
                        Error::DegenerateCell {
                            site: index,
                            reason: format!("{} ({})", reason, site_label(site)),
                        }
                    );
                    None
                }
            })
            .collect();

        for outcome in &outcomes {
            match outcome {
                Some(outcome) => {
                    stats.cells += 1;
                    stats.record_clip(outcome.flags);
                }
                None => stats.degenerate_cells += 1,
            }
        }
        Ok(outcomes)
    }

    /// Write `key` unless it already exists. Returns whether it was written.
    /// A failed write is logged and recorded so the rest of the region still
    /// gets written.
    fn write(
        &self,
        key: &ArtifactKey,
        geometry: &MultiPolygon<f64>,
        properties: &Properties,
        stats: &mut UnitStats,
    ) -> bool {
        let result = self.sink.exists(key).and_then(|exists| {
            if exists {
                return Ok(false);
            }
            self.sink.put(key, geometry, properties).map(|()| true)
        });
        match result {
            Ok(true) => true,
            Ok(false) => {
                stats.artifacts_skipped += 1;
                false
            }
            Err(e) => {
                log::error!("{}: write failed: {}", key, e);
                stats.failed_writes.push(key.to_string());
                false
            }
        }
    }

    fn write_units(&self, cells: &mut [Option<ClipOutcome>], stats: &mut UnitStats) {
        let mut parts: BTreeMap<&PostalCode, (Vec<MultiPolygon<f64>>, bool)> = BTreeMap::new();
        for (site, cell) in self.sites.iter().zip(cells.iter_mut()) {
            let Some(code) = site.single_code() else {
                continue;
            };
            if let Some(outcome) = cell.take() {
                let entry = parts.entry(code).or_default();
                entry.0.push(outcome.geometry);
                entry.1 |= outcome.flags.degraded;
            }
        }

        for (code, (geometries, degraded)) in parts {
            let key = ArtifactKey::unit(code.as_str());
            let label = key.to_string();
            let mut flags = ClipFlags {
                degraded,
                ..ClipFlags::default()
            };
            let geometry = merge_parts(geometries, &label, &mut flags);
            let geometry = ensure_valid(geometry, &label, &mut flags);
            if flags.degraded {
                stats.degraded_keys.push(label);
            }

            let mut properties = Properties::new();
            properties.insert("postcodes".into(), json!(code.as_str()));
            properties.insert("region_code".into(), json!(self.region.as_str()));
            if self.write(&key, &geometry, &properties, stats) {
                stats.units_written += 1;
            }
        }
    }

    fn write_vertical_streets(&self, cells: &mut [Option<ClipOutcome>], stats: &mut UnitStats) {
        for street in vertical::resolve(&self.sites) {
            let Some(outcome) = cells[street.site_index].take() else {
                continue;
            };
            let key = street.key();
            let outcodes = street.outcodes();
            if outcodes.len() > 1 {
                log::warn!(
                    "{}: vertical street spans {} outcodes ({})",
                    key,
                    outcodes.len(),
                    outcodes.into_iter().collect::<Vec<_>>().join(", ")
                );
            }
            if outcome.flags.degraded {
                stats.degraded_keys.push(key.to_string());
            }
            if self.write(&key, &outcome.geometry, &street.properties(&self.region), stats) {
                stats.vertical_streets_written += 1;
            }
        }
    }
}

fn site_label(site: &Site) -> String {
    let codes: Vec<&str> = site.postcodes.iter().map(|c| c.as_str()).collect();
    format!("{} @ {},{}", codes.join(","), site.coordinate.x, site.coordinate.y)
}

impl WorkUnit for RegionUnit {
    fn name(&self) -> String {
        format!("region/{}", self.region)
    }

    fn is_complete(&self) -> Result<bool> {
        for key in self.expected_keys() {
            if !self.sink.exists(&key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn execute(self: Box<Self>) -> Result<UnitStats> {
        let _t = Timed::info(format!("Region {} ({} sites)", self.region, self.sites.len()));
        let mut stats = UnitStats {
            sites: self.sites.len(),
            ..UnitStats::default()
        };

        let mut cells = self.clip_cells(&mut stats)?;
        self.write_vertical_streets(&mut cells, &mut stats);
        self.write_units(&mut cells, &mut stats);

        log::info!(
            "{}: {} cells ({} degenerate, {} clipped), {} units and {} vertical streets written",
            self.region,
            stats.cells,
            stats.degenerate_cells,
            stats.clipped,
            stats.units_written,
            stats.vertical_streets_written
        );
        if stats.degenerate_cells > 0 {
            log::warn!("{}: {} sites produced no cell", self.region, stats.degenerate_cells);
        }
        if !stats.failed_writes.is_empty() {
            log::error!("{}: {} artifacts could not be written", self.region, stats.failed_writes.len());
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{InfinityRing, Projection};
    use crate::ingest::{GridPoint, SiteTable};
    use crate::storage::{ArtifactKind, MemorySink};
    use geo::polygon;

    fn config(ring: InfinityRing) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            ring,
            projection: Projection::Identity,
            ..PipelineConfig::default()
        })
    }

    fn boundary(size: f64) -> Arc<ReferenceBoundary> {
        Arc::new(ReferenceBoundary::new(MultiPolygon::new(vec![polygon![
            (x: -size, y: -size),
            (x: size, y: -size),
            (x: size, y: size),
            (x: -size, y: size),
        ]])))
    }

    fn unit(table: SiteTable, ring: InfinityRing, sink: Arc<MemorySink>) -> RegionUnit {
        RegionUnit::new(
            RegionCode::from("SC"),
            table.into_sites(),
            boundary(10_000.0),
            config(ring),
            Arc::new(InlandSectors::default()),
            sink,
        )
    }

    fn code(s: &str) -> PostalCode {
        PostalCode::parse(s).unwrap()
    }

    #[test]
    fn test_lattice_without_ring() {
        let mut table = SiteTable::new();
        for (i, c) in ["AB1 1AA", "AB1 1AB", "AB1 1AD"].iter().enumerate() {
            for j in 0..3 {
                table.add(GridPoint::new(i as i64 * 100, j * 100), code(c), &format!("{}{}", i, j));
            }
        }
        let sink = Arc::new(MemorySink::new());
        let stats = Box::new(unit(table, InfinityRing::disabled(), sink.clone())).execute().unwrap();

        assert_eq!(stats.sites, 9);
        assert_eq!(stats.cells, 1, "only the centre site is enclosed");
        assert_eq!(stats.degenerate_cells, 8);
        assert_eq!(sink.keys_of(ArtifactKind::Unit), vec![ArtifactKey::unit("AB1 1AB")]);
    }

    #[test]
    fn test_expected_keys_and_completion() {
        let mut table = SiteTable::new();
        table.add(GridPoint::new(0, 0), code("AB1 2CD"), "1");
        table.add(GridPoint::new(0, 0), code("AB1 2EF"), "2");
        table.add(GridPoint::new(500, 0), code("AB1 2GH"), "3");
        table.add(GridPoint::new(0, 500), code("AB1 2GH"), "4");
        let sink = Arc::new(MemorySink::new());
        let region = unit(table, InfinityRing::default(), sink.clone());

        let keys: Vec<String> = region.expected_keys().iter().map(ToString::to_string).collect();
        assert_eq!(keys, ["unit/AB1 2GH", "vertical-street/0,0-AB1 2CD,AB1 2EF"]);
        assert!(!region.is_complete().unwrap());

        let stats = Box::new(region).execute().unwrap();
        assert_eq!(stats.units_written, 1);
        assert_eq!(stats.vertical_streets_written, 1);
        assert_eq!(sink.writes(), 2);

        let street = sink
            .get(&ArtifactKey::vertical_street(0, 0, &["AB1 2CD", "AB1 2EF"]))
            .unwrap()
            .unwrap();
        assert_eq!(street.properties["postcodes"], json!("AB1 2CD, AB1 2EF"));
        assert_eq!(street.properties["uprns"], json!("1, 2"));
    }
}
