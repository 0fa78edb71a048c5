use std::path::Path;

use rustc_hash::FxHashSet;

use super::{compact, PostalCode};
use crate::constants::RESERVED_PREFIXES;
use crate::{Error, Result};

/// Result of normalising one raw postcode field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Code(PostalCode),
    /// Missing or blank field.
    Empty,
    /// Non-geographic reserved code (e.g. `GIR 0AA`).
    Reserved,
    /// Present in the terminated-code list.
    Terminated,
    /// Does not start with the configured prefix filter.
    FilteredOut,
}

impl Normalized {
    pub fn code(self) -> Option<PostalCode> {
        match self {
            Normalized::Code(code) => Some(code),
            _ => None,
        }
    }
}

/// Validates raw postcode fields and filters the ones the pipeline ignores.
#[derive(Debug, Clone)]
pub struct Normalizer {
    reserved_prefixes: Vec<String>,
    terminated: FxHashSet<String>,
    prefix_filter: Option<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            reserved_prefixes: RESERVED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            terminated: FxHashSet::default(),
            prefix_filter: None,
        }
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserved_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reserved_prefixes = prefixes.into_iter().map(|p| compact(p.as_ref())).collect();
        self
    }

    /// Canonical codes to exclude.
    pub fn with_terminated(mut self, terminated: FxHashSet<String>) -> Self {
        self.terminated = terminated;
        self
    }

    /// Keep only codes whose canonical form starts with `prefix`.
    pub fn with_prefix_filter(mut self, prefix: Option<String>) -> Self {
        self.prefix_filter = prefix
            .map(|p| p.trim().to_ascii_uppercase())
            .filter(|p| !p.is_empty());
        self
    }

    pub fn terminated_count(&self) -> usize {
        self.terminated.len()
    }

    /// Normalise one raw field.
    ///
    /// Blank, reserved, terminated and filtered codes are outcomes, not
    /// errors; only a grammar mismatch fails with [`Error::MalformedCode`].
    pub fn normalize(&self, raw: &str) -> Result<Normalized> {
        let compacted = compact(raw);
        if compacted.is_empty() {
            return Ok(Normalized::Empty);
        }
        if self
            .reserved_prefixes
            .iter()
            .any(|p| compacted.starts_with(p.as_str()))
        {
            return Ok(Normalized::Reserved);
        }
        let code = PostalCode::parse(&compacted).map_err(|_| Error::MalformedCode(raw.to_string()))?;
        if let Some(prefix) = &self.prefix_filter {
            if !code.as_str().starts_with(prefix.as_str()) {
                return Ok(Normalized::FilteredOut);
            }
        }
        if self.terminated.contains(code.as_str()) {
            return Ok(Normalized::Terminated);
        }
        Ok(Normalized::Code(code))
    }
}

/// Normalise with the default rules: `Some` for a usable code, `None` for
/// blank or reserved input.
pub fn normalize(raw: &str) -> Result<Option<PostalCode>> {
    Normalizer::default().normalize(raw).map(Normalized::code)
}

/// Load terminated codes from an ONSPD-style CSV: rows with a non-empty
/// `doterm` column are terminated. Codes are read from `pcds` (or `pcd`).
pub fn load_terminated(path: &Path) -> Result<FxHashSet<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let code_col = column("pcds")
        .or_else(|| column("pcd"))
        .ok_or_else(|| Error::Config(format!("{}: no pcds column", path.display())))?;
    let doterm_col = column("doterm")
        .ok_or_else(|| Error::Config(format!("{}: no doterm column", path.display())))?;

    let mut terminated = FxHashSet::default();
    for record in reader.records() {
        let record = record?;
        let doterm = record.get(doterm_col).unwrap_or("").trim();
        if doterm.is_empty() {
            continue;
        }
        match PostalCode::parse(record.get(code_col).unwrap_or("")) {
            Ok(code) => {
                terminated.insert(String::from(code));
            }
            Err(e) => log::debug!("ignoring terminated entry: {}", e),
        }
    }
    log::info!("Loaded {} terminated postcodes", terminated.len());
    Ok(terminated)
}
