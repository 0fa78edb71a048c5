//! NSUL (National Statistics UPRN Lookup) CSV reader.

use std::fs::File;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{GridPoint, RawRecord};
use crate::region::{RegionCatalog, RegionCode};
use crate::{Error, Result};

const COLUMN_POSTCODE: &str = "pcds";
const COLUMN_E: &str = "gridgb1e";
const COLUMN_N: &str = "gridgb1n";
const COLUMN_UPRN: &str = "uprn";

static NSUL_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"NSUL_\w+_\d+_([A-Z]{2})\.csv$").expect("filename pattern is a valid regex")
});

/// Region code encoded in an NSUL file name, e.g.
/// `NSUL_JAN_2024_SC.csv` -> `SC`.
pub fn region_from_filename(path: &Path, catalog: &RegionCatalog) -> Result<RegionCode> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("{}: not a file name", path.display())))?;
    let caps = NSUL_FILENAME.captures(name).ok_or_else(|| {
        Error::Config(format!(
            "unexpected CSV file name {:?}; expected NSUL_<month>_<year>_<region>.csv",
            name
        ))
    })?;
    catalog.parse(&caps[1])
}

/// Parse a grid coordinate, ignoring thousands separators.
fn parse_coordinate(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|&c| c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

/// An opened NSUL CSV file for one region.
pub struct NsulFile {
    path: PathBuf,
    region: RegionCode,
    reader: csv::Reader<File>,
    columns: [usize; 4],
}

impl NsulFile {
    pub fn open(path: &Path, catalog: &RegionCatalog) -> Result<Self> {
        let region = region_from_filename(path, catalog)?;
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::Config(format!("{}: missing column {}", path.display(), name)))
        };
        let columns = [
            column(COLUMN_POSTCODE)?,
            column(COLUMN_E)?,
            column(COLUMN_N)?,
            column(COLUMN_UPRN)?,
        ];
        Ok(Self {
            path: path.to_path_buf(),
            region,
            reader,
            columns,
        })
    }

    pub fn region(&self) -> &RegionCode {
        &self.region
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the file's rows as raw records tagged with its region.
    pub fn records(self) -> impl Iterator<Item = Result<RawRecord>> {
        let Self {
            region,
            reader,
            columns: [pc, e, n, uprn],
            ..
        } = self;
        reader.into_records().map(move |row| {
            let row = row?;
            let field = |i: usize| row.get(i).unwrap_or("");
            let coordinate = match (parse_coordinate(field(e)), parse_coordinate(field(n))) {
                (Some(x), Some(y)) => Some(GridPoint::new(x, y)),
                _ => None,
            };
            Ok(RawRecord {
                postcode: field(pc).to_string(),
                coordinate,
                property_reference: field(uprn).trim().to_string(),
                region: region.as_str().to_string(),
            })
        })
    }
}
