//! Run orchestration.
//!
//! Phases run strictly in order: boundary resolution (fails fast), one
//! [`RegionUnit`] per macro region, then sectors, districts and areas. Within
//! a phase, units run in parallel on the [`BatchExecutor`].
//!
//! An aggregate is only built when every region feeding it and every child
//! aggregate below it succeeded in this run. Otherwise it is deferred and
//! left unwritten, so the next run builds it from complete inputs.

mod aggregate;
mod executor;
mod region;
mod report;
pub mod vertical;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::boundary::BoundaryProvider;
use crate::config::PipelineConfig;
use crate::geometry::ReferenceBoundary;
use crate::hints::InlandSectors;
use crate::ingest::Partitions;
use crate::region::RegionCode;
use crate::storage::{ArtifactKey, ArtifactKind, StorageSink};
use crate::util::Timed;
use crate::Result;

pub use aggregate::{aggregate_label, AggregateNode, AggregateUnit, HierarchyPlan};
pub use executor::{BatchExecutor, BatchSummary, UnitFailure, UnitOutcome, WorkUnit};
pub use region::RegionUnit;
pub use report::{RunReport, UnitStats};

/// Phase names as they appear in the run report.
pub const PHASE_REGIONS: &str = "regions";
pub const PHASE_SECTORS: &str = "sectors";
pub const PHASE_DISTRICTS: &str = "districts";
pub const PHASE_AREAS: &str = "areas";

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    sink: Arc<dyn StorageSink>,
    boundaries: Arc<dyn BoundaryProvider>,
    hints: Arc<InlandSectors>,
    skip_aggregation: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn StorageSink>, boundaries: Arc<dyn BoundaryProvider>) -> Self {
        Self {
            config: Arc::new(config),
            sink,
            boundaries,
            hints: Arc::new(InlandSectors::default()),
            skip_aggregation: false,
        }
    }

    pub fn with_inland_sectors(mut self, hints: InlandSectors) -> Self {
        self.hints = Arc::new(hints);
        self
    }

    /// Stop after the region phase.
    pub fn with_skip_aggregation(mut self, skip: bool) -> Self {
        self.skip_aggregation = skip;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Reference boundaries for every region present in `partitions`.
    ///
    /// Fails with `MissingReferenceBoundary` or `AmbiguousReferenceBoundary`
    /// before any work starts.
    pub fn resolve_boundaries(&self, partitions: &Partitions) -> Result<BTreeMap<RegionCode, Arc<ReferenceBoundary>>> {
        let _t = Timed::debug("Resolving reference boundaries");
        partitions
            .regions
            .keys()
            .map(|region| {
                let geometry = self.boundaries.get_reference_boundary(region)?;
                Ok((region.clone(), Arc::new(ReferenceBoundary::new(geometry))))
            })
            .collect()
    }

    /// Run every phase over `partitions`. Unit failures are recorded in the
    /// report; only configuration and boundary errors return `Err`.
    pub fn run(&self, partitions: Partitions) -> Result<RunReport> {
        let _t = Timed::info("Pipeline");
        self.config.validate()?;
        let boundaries = self.resolve_boundaries(&partitions)?;
        let executor = BatchExecutor::new(self.config.worker_count())?;
        log::info!(
            "Processing {} sites in {} regions on {} workers",
            partitions.site_count(),
            partitions.regions.len(),
            executor.workers()
        );

        let plan = (!self.skip_aggregation).then(|| HierarchyPlan::build(&partitions, self.config.label_budget));

        let Partitions {
            regions,
            stats,
            conflicts,
        } = partitions;
        let mut report = RunReport::new(stats, conflicts);

        let mut unit_regions: BTreeMap<String, RegionCode> = BTreeMap::new();
        let units: Vec<Box<dyn WorkUnit>> = regions
            .into_iter()
            .filter_map(|(region, table)| {
                let boundary = boundaries.get(&region)?.clone();
                let unit = RegionUnit::new(
                    region.clone(),
                    table.into_sites(),
                    boundary,
                    Arc::clone(&self.config),
                    Arc::clone(&self.hints),
                    Arc::clone(&self.sink),
                );
                unit_regions.insert(unit.name(), region);
                Some(Box::new(unit) as Box<dyn WorkUnit>)
            })
            .collect();
        let summary = executor.run(PHASE_REGIONS, units);
        let failed_regions: BTreeSet<RegionCode> = summary
            .failures
            .iter()
            .filter_map(|f| unit_regions.get(&f.unit).cloned())
            .collect();
        report.push(summary);

        if let Some(plan) = plan {
            let mut blocked: BTreeSet<ArtifactKey> = BTreeSet::new();
            for (phase, kind) in [
                (PHASE_SECTORS, ArtifactKind::Sector),
                (PHASE_DISTRICTS, ArtifactKind::District),
                (PHASE_AREAS, ArtifactKind::Area),
            ] {
                let (units, deferred) = plan.ready_units(kind, &self.sink, &failed_regions, &mut blocked);
                let mut summary = executor.run(phase, units);
                blocked.extend(summary.failures.iter().filter_map(|f| f.unit.parse::<ArtifactKey>().ok()));
                summary.deferred = deferred;
                report.push(summary);
            }
        }

        report.log_summary();
        Ok(report)
    }
}
