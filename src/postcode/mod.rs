//! Postal codes and their hierarchy keys.
//!
//! A canonical code is `<outcode> <sector digit><unit letters>`, e.g.
//! `AB1 2CD`. Its sector is `AB1 2`, its district is the outcode `AB1` and
//! its area is the leading letters `AB`.

mod normalizer;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use normalizer::{load_terminated, normalize, Normalized, Normalizer};

/// National postcode grammar, matched against the upper-cased code with all
/// whitespace removed.
static POSTCODE_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-PR-UWYZ](?:[0-9][0-9A-HJKPS-UW]?|[A-HK-Y][0-9][0-9ABEHMNPRV-Y]?))([0-9][A-Z]{2})$",
    )
    .expect("postcode grammar is a valid regex")
});

/// Upper-case and drop all whitespace.
pub(crate) fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// A validated, canonical postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode {
    code: String,
    /// Byte offset of the separating space.
    split: usize,
}

impl PostalCode {
    /// Validate and canonicalise `raw`. Case and whitespace are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let compacted = compact(raw);
        let caps = POSTCODE_GRAMMAR
            .captures(&compacted)
            .ok_or_else(|| Error::MalformedCode(raw.to_string()))?;
        let outcode = &caps[1];
        let inward = &caps[2];
        Ok(Self {
            code: format!("{} {}", outcode, inward),
            split: outcode.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// Outward code, e.g. `AB1`.
    pub fn outcode(&self) -> &str {
        &self.code[..self.split]
    }

    /// Inward code, e.g. `2CD`.
    pub fn inward(&self) -> &str {
        &self.code[self.split + 1..]
    }

    /// Sector key, e.g. `AB1 2`.
    pub fn sector(&self) -> &str {
        &self.code[..self.split + 2]
    }

    /// District key (the outcode).
    pub fn district(&self) -> &str {
        self.outcode()
    }

    /// Area key: the leading letters of the outcode, e.g. `AB`.
    pub fn area(&self) -> &str {
        area_of(self.outcode())
    }
}

/// Leading alphabetic prefix of a district or sector key.
pub fn area_of(key: &str) -> &str {
    let end = key
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(key.len());
    &key[..end]
}

/// District (outcode) of a sector key such as `AB1 2`.
pub fn district_of_sector(sector: &str) -> &str {
    sector.split(' ').next().unwrap_or(sector)
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl FromStr for PostalCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PostalCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(value: PostalCode) -> Self {
        value.code
    }
}

impl AsRef<str> for PostalCode {
    fn as_ref(&self) -> &str {
        &self.code
    }
}
