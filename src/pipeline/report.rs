//! Counters and the end-of-run report.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use super::executor::BatchSummary;
use crate::geometry::ClipFlags;
use crate::ingest::{IngestStats, RegionConflict};
use crate::{Error, Result};

/// What one work unit did. Summed per phase and per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitStats {
    pub sites: usize,
    pub cells: usize,
    pub degenerate_cells: usize,
    pub clipped: usize,
    pub clip_fallbacks: usize,
    pub repaired: usize,
    pub degraded: usize,
    pub units_written: usize,
    pub vertical_streets_written: usize,
    pub aggregates_written: usize,
    /// Artifacts already present in the sink and left untouched.
    pub artifacts_skipped: usize,
    pub missing_children: usize,
    /// Aggregates with no stored children; nothing is written for them.
    pub empty_aggregates: usize,
    /// Keys of artifacts written best-effort after a failed repair.
    pub degraded_keys: Vec<String>,
    /// Keys whose write failed. A unit with any is reported as failed.
    pub failed_writes: Vec<String>,
}

impl UnitStats {
    pub fn record_clip(&mut self, flags: ClipFlags) {
        self.clipped += usize::from(flags.clipped);
        self.clip_fallbacks += usize::from(flags.fell_back);
        self.repaired += usize::from(flags.repaired);
        self.degraded += usize::from(flags.degraded);
    }

    pub fn written(&self) -> usize {
        self.units_written + self.vertical_streets_written + self.aggregates_written
    }

    pub fn merge(&mut self, other: &UnitStats) {
        self.sites += other.sites;
        self.cells += other.cells;
        self.degenerate_cells += other.degenerate_cells;
        self.clipped += other.clipped;
        self.clip_fallbacks += other.clip_fallbacks;
        self.repaired += other.repaired;
        self.degraded += other.degraded;
        self.units_written += other.units_written;
        self.vertical_streets_written += other.vertical_streets_written;
        self.aggregates_written += other.aggregates_written;
        self.artifacts_skipped += other.artifacts_skipped;
        self.missing_children += other.missing_children;
        self.empty_aggregates += other.empty_aggregates;
        self.degraded_keys.extend(other.degraded_keys.iter().cloned());
        self.failed_writes.extend(other.failed_writes.iter().cloned());
    }
}

/// Everything an operator needs after a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub ingest: IngestStats,
    pub conflicts: Vec<RegionConflict>,
    pub phases: Vec<BatchSummary>,
    pub totals: UnitStats,
}

impl RunReport {
    pub fn new(ingest: IngestStats, conflicts: Vec<RegionConflict>) -> Self {
        Self {
            ingest,
            conflicts,
            ..Self::default()
        }
    }

    pub fn push(&mut self, summary: BatchSummary) {
        self.totals.merge(&summary.stats);
        self.phases.push(summary);
    }

    pub fn phase(&self, name: &str) -> Option<&BatchSummary> {
        self.phases.iter().find(|p| p.phase == name)
    }

    pub fn failed_units(&self) -> usize {
        self.phases.iter().map(|p| p.failed).sum()
    }

    pub fn deferred_units(&self) -> usize {
        self.phases.iter().map(|p| p.deferred.len()).sum()
    }

    /// True when no unit failed or was deferred.
    pub fn is_success(&self) -> bool {
        self.failed_units() == 0 && self.deferred_units() == 0
    }

    pub fn log_summary(&self) {
        for phase in &self.phases {
            log::info!(
                "{}: {} completed, {} skipped, {} failed, {} deferred",
                phase.phase,
                phase.completed,
                phase.skipped,
                phase.failed,
                phase.deferred.len()
            );
        }
        let t = &self.totals;
        log::info!(
            "Wrote {} artifacts ({} units, {} vertical streets, {} aggregates); {} already present",
            t.written(),
            t.units_written,
            t.vertical_streets_written,
            t.aggregates_written,
            t.artifacts_skipped
        );
        log::info!(
            "Cells: {} emitted, {} degenerate, {} clipped, {} clip fallbacks, {} repaired, {} degraded",
            t.cells,
            t.degenerate_cells,
            t.clipped,
            t.clip_fallbacks,
            t.repaired,
            t.degraded
        );
        if !t.failed_writes.is_empty() {
            log::error!("{} artifacts could not be written; rerun to retry them", t.failed_writes.len());
        }
        if !self.conflicts.is_empty() {
            log::warn!("{} postcodes appear in more than one region", self.conflicts.len());
        }
    }

    /// Write the report as JSON, gzipped when the path ends in `.gz`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::file(path, e))?;
        let writer = BufWriter::new(file);
        if path.extension().is_some_and(|ext| ext == "gz") {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            serde_json::to_writer_pretty(&mut encoder, self)?;
            encoder
                .finish()
                .and_then(|mut w| w.flush())
                .map_err(|e| Error::file(path, e))?;
        } else {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush().map_err(|e| Error::file(path, e))?;
        }
        log::info!("Wrote run report to {}", path.display());
        Ok(())
    }
}
