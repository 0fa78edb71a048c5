//! Artifact storage.
//!
//! Every output polygon is an artifact identified by an [`ArtifactKey`]. A
//! [`StorageSink`] persists artifacts all-or-nothing and must accept
//! concurrent writes to distinct keys.

mod dir;
pub mod geojson;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use dir::DirectorySink;
pub use memory::MemorySink;

/// Attribute map stored alongside each geometry.
pub type Properties = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Unit,
    VerticalStreet,
    Sector,
    District,
    Area,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Unit,
        ArtifactKind::VerticalStreet,
        ArtifactKind::Sector,
        ArtifactKind::District,
        ArtifactKind::Area,
    ];

    /// Key namespace.
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Unit => "unit",
            ArtifactKind::VerticalStreet => "vertical-street",
            ArtifactKind::Sector => "sector",
            ArtifactKind::District => "district",
            ArtifactKind::Area => "area",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<kind>/<name>`, e.g. `unit/AB1 2CD` or `sector/AB1 2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub name: String,
}

impl ArtifactKey {
    pub fn new(kind: ArtifactKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn unit(code: &str) -> Self {
        Self::new(ArtifactKind::Unit, code)
    }

    pub fn sector(sector: &str) -> Self {
        Self::new(ArtifactKind::Sector, sector)
    }

    pub fn district(district: &str) -> Self {
        Self::new(ArtifactKind::District, district)
    }

    pub fn area(area: &str) -> Self {
        Self::new(ArtifactKind::Area, area)
    }

    /// `<e>,<n>-<code>,<code>...` for codes sharing one coordinate.
    pub fn vertical_street<S: AsRef<str>>(e: i64, n: i64, codes: &[S]) -> Self {
        let joined: Vec<&str> = codes.iter().map(AsRef::as_ref).collect();
        Self::new(
            ArtifactKind::VerticalStreet,
            format!("{},{}-{}", e, n, joined.join(",")),
        )
    }

    /// The outcode a unit or vertical-street key files under.
    pub fn outcode(&self) -> Option<&str> {
        match self.kind {
            ArtifactKind::Unit => self.name.split(' ').next(),
            ArtifactKind::VerticalStreet => self
                .name
                .rsplit_once('-')
                .and_then(|(_, codes)| codes.split(' ').next()),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ArtifactKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| Error::Storage(format!("artifact key {:?} has no kind", s)))?;
        let kind = ArtifactKind::ALL
            .into_iter()
            .find(|k| k.as_str() == kind)
            .ok_or_else(|| Error::Storage(format!("unknown artifact kind {:?}", kind)))?;
        Ok(Self::new(kind, name))
    }
}

impl Serialize for ArtifactKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A stored geometry with its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub key: ArtifactKey,
    pub geometry: MultiPolygon<f64>,
    pub properties: Properties,
}

/// Persists finished polygons.
///
/// Implementations must be safe for concurrent calls with distinct keys and
/// must never expose a partially written artifact.
pub trait StorageSink: Send + Sync {
    fn put(&self, key: &ArtifactKey, geometry: &MultiPolygon<f64>, properties: &Properties) -> Result<()>;

    fn exists(&self, key: &ArtifactKey) -> Result<bool>;

    fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>>;
}
