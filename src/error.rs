use std::path::PathBuf;

use planar_voronoi::VoronoiError;
use thiserror::Error;

/// Errors raised by the boundary-synthesis pipeline.
///
/// Record- and cell-level variants are absorbed where they occur and only
/// counted; boundary variants abort a run before any work starts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed postcode {0:?}")]
    MalformedCode(String),

    #[error("degenerate cell for site {site}: {reason}")]
    DegenerateCell { site: usize, reason: String },

    #[error("geometry repair failed for {key}: {detail}")]
    GeometryRepairFailure { key: String, detail: String },

    #[error("no reference boundary for region {0}")]
    MissingReferenceBoundary(String),

    #[error("{count} reference boundaries match region {region}")]
    AmbiguousReferenceBoundary { region: String, count: usize },

    #[error("work unit {unit} failed: {reason}")]
    UnitExecutionFailure { unit: String, reason: String },

    #[error("unknown region {0:?}")]
    UnknownRegion(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tessellation failed: {0}")]
    Voronoi(#[from] VoronoiError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid GeoJSON in {origin}: {detail}")]
    GeoJson { origin: String, detail: String },

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::File {
            path: path.into(),
            source,
        }
    }

    pub fn geojson(origin: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::GeoJson {
            origin: origin.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
