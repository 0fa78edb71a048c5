//! Constants for ingestion, tessellation and aggregation.

/// Easting of the national reference centroid (centre of Great Britain).
pub const CENTRE_OF_GB_E: f64 = 364_188.0;

/// Northing of the national reference centroid.
pub const CENTRE_OF_GB_N: f64 = 456_541.0;

/// Southernmost and northernmost national grid northings, used to size the
/// infinity ring from the country's north-south extent.
pub const NATIONAL_MIN_N: f64 = 3_706.0;
pub const NATIONAL_MAX_N: f64 = 1_219_109.0;

/// National grid extent in metres. Records outside it are rejected at
/// ingestion.
pub const NATIONAL_GRID_MAX_E: i64 = 700_000;
pub const NATIONAL_GRID_MAX_N: i64 = 1_300_000;

/// Ring radius as a multiple of the north-south extent.
pub const INFINITY_RING_RADIUS_FACTOR: f64 = 1.5;

/// Number of synthetic sites on the infinity ring.
pub const INFINITY_RING_POINTS: usize = 200;

/// A real site beyond this fraction of the ring radius triggers enlargement.
pub const INFINITY_RING_MARGIN: f64 = 0.9;

/// Consecutive cell vertices closer than this (in grid metres) are merged.
pub const DEFAULT_WELD_DISTANCE: f64 = 1e-6;

/// Maximum length of an aggregate's `postcodes` label.
pub const LABEL_BUDGET: usize = 1000;

pub const LABEL_SEPARATOR: &str = ", ";

/// Appended to a truncated label; counts toward the budget.
pub const LABEL_ELLIPSIS: &str = "...";

/// Reserved, non-geographic postcode prefixes (Girobank).
pub const RESERVED_PREFIXES: &[&str] = &["GIR"];

/// Longest file stem a directory sink writes; longer names are shortened
/// and suffixed with a hash of the full name.
pub const MAX_FILE_STEM: usize = 160;

/// Ingestion logs progress every this many records.
pub const PROGRESS_INTERVAL: usize = 100_000;

/// Area below which a repaired ring is treated as degenerate (square degrees
/// or square metres, depending on the projection).
pub const MIN_RING_AREA: f64 = 1e-14;

/// Default GB macro regions: European electoral regions.
pub const GB_REGIONS: &[(&str, &str)] = &[
    ("EE", "Eastern Euro Region"),
    ("EM", "East Midlands Euro Region"),
    ("LN", "London Euro Region"),
    ("NE", "North East Euro Region"),
    ("NW", "North West Euro Region"),
    ("SC", "Scotland Euro Region"),
    ("SE", "South East Euro Region"),
    ("SW", "South West Euro Region"),
    ("WA", "Wales Euro Region"),
    ("WM", "West Midlands Euro Region"),
    ("YH", "Yorkshire and the Humber Euro Region"),
];
