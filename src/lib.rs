//! Postcode boundary synthesis.
//!
//! Address points tagged with postcodes are deduplicated per coordinate,
//! partitioned by macro region and tessellated into Voronoi cells. Cells are
//! clipped to each region's coastline, repaired, and written as unit
//! polygons, vertical-street composites, and unioned sector, district and
//! area polygons.
//!
//! ```ignore
//! let mut partitioner =
//!     Partitioner::new(config.regions.clone(), config.normalizer(terminated)).with_extent(config.extent);
//! ingest::ingest_files(&files, &mut partitioner)?;
//! let report = Pipeline::new(config, sink, boundaries).run(partitioner.finish())?;
//! ```

pub mod boundary;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod hints;
pub mod ingest;
pub mod pipeline;
pub mod postcode;
pub mod region;
pub mod storage;
pub mod util;

pub use error::{Error, Result};
