//! Macro regions: the fixed national subdivisions used to partition input
//! and to supply clipping boundaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::GB_REGIONS;
use crate::{Error, Result};

/// Short code of a macro region (e.g. `"SC"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable code → display-name table, injected wherever region names are
/// needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCatalog {
    names: BTreeMap<RegionCode, String>,
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::great_britain()
    }
}

impl RegionCatalog {
    /// The eleven GB European electoral regions.
    pub fn great_britain() -> Self {
        GB_REGIONS
            .iter()
            .map(|&(code, name)| (RegionCode::from(code), name.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, code: &RegionCode) -> bool {
        self.names.contains_key(code)
    }

    pub fn name(&self, code: &RegionCode) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    /// Reverse lookup by display name.
    pub fn code_for_name(&self, name: &str) -> Option<&RegionCode> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(code, _)| code)
    }

    /// Validate a raw code against the catalog.
    pub fn parse(&self, raw: &str) -> Result<RegionCode> {
        let code = RegionCode::new(raw.trim());
        if self.contains(&code) {
            Ok(code)
        } else {
            Err(Error::UnknownRegion(raw.to_string()))
        }
    }

    /// Codes in sorted order.
    pub fn codes(&self) -> impl Iterator<Item = &RegionCode> {
        self.names.keys()
    }
}

impl FromIterator<(RegionCode, String)> for RegionCatalog {
    fn from_iter<I: IntoIterator<Item = (RegionCode, String)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}
