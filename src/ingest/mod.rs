//! Address-point ingestion: raw feed records, per-coordinate site tables and
//! the per-region partitioner.

mod dedup;
mod feed;
mod partition;

pub use dedup::{Site, SiteTable};
pub use feed::{region_from_filename, NsulFile};
pub use partition::{GridExtent, IngestStats, Partitioner, Partitions, RegionConflict};

pub use planar_voronoi::GridPoint;

use std::path::PathBuf;

use crate::util::Timed;
use crate::Result;

/// One row of the source point feed, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub postcode: String,
    /// Projected integer eastings/northings; `None` when missing or
    /// unparseable.
    pub coordinate: Option<GridPoint>,
    pub property_reference: String,
    pub region: String,
}

impl RawRecord {
    pub fn new(
        postcode: impl Into<String>,
        coordinate: impl Into<Option<GridPoint>>,
        property_reference: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            postcode: postcode.into(),
            coordinate: coordinate.into(),
            property_reference: property_reference.into(),
            region: region.into(),
        }
    }
}

/// Stream NSUL files into `partitioner`, in the given order.
///
/// Rows that cannot be read are counted as malformed; a file that cannot be
/// opened (or whose name carries no known region) fails the whole ingest.
pub fn ingest_files(paths: &[PathBuf], partitioner: &mut Partitioner) -> Result<()> {
    let _t = Timed::info(format!("Ingesting {} files", paths.len()));
    for path in paths {
        let file = NsulFile::open(path, partitioner.catalog())?;
        log::info!("Reading {} (region {})", path.display(), file.region());
        for record in file.records() {
            match record {
                Ok(record) => partitioner.push(record),
                Err(e) => partitioner.skip_unreadable(&e),
            }
        }
    }
    Ok(())
}
