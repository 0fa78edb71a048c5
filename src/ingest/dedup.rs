use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use super::GridPoint;
use crate::postcode::PostalCode;

/// A distinct coordinate within one region and everything observed there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub coordinate: GridPoint,
    pub postcodes: BTreeSet<PostalCode>,
    pub property_references: BTreeSet<String>,
}

impl Site {
    fn new(coordinate: GridPoint) -> Self {
        Self {
            coordinate,
            postcodes: BTreeSet::new(),
            property_references: BTreeSet::new(),
        }
    }

    /// More than one postcode at one coordinate.
    pub fn is_vertical_street(&self) -> bool {
        self.postcodes.len() > 1
    }

    /// The single postcode of a non-vertical-street site.
    pub fn single_code(&self) -> Option<&PostalCode> {
        match self.postcodes.len() {
            1 => self.postcodes.iter().next(),
            _ => None,
        }
    }
}

/// Sites of one region in first-seen coordinate order.
///
/// Site order is the tessellation's input order, so it must depend only on
/// the order of the records pushed.
#[derive(Debug, Clone, Default)]
pub struct SiteTable {
    sites: Vec<Site>,
    index: FxHashMap<GridPoint, usize>,
}

impl SiteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one address at `coordinate`. Returns the site index.
    pub fn add(&mut self, coordinate: GridPoint, postcode: PostalCode, property_reference: &str) -> usize {
        let sites = &mut self.sites;
        let idx = *self.index.entry(coordinate).or_insert_with(|| {
            sites.push(Site::new(coordinate));
            sites.len() - 1
        });
        let site = &mut self.sites[idx];
        site.postcodes.insert(postcode);
        if !property_reference.is_empty() {
            site.property_references.insert(property_reference.to_string());
        }
        idx
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn into_sites(self) -> Vec<Site> {
        self.sites
    }

    pub fn site_at(&self, coordinate: GridPoint) -> Option<&Site> {
        self.index.get(&coordinate).map(|&i| &self.sites[i])
    }

    pub fn vertical_street_count(&self) -> usize {
        self.sites.iter().filter(|s| s.is_vertical_street()).count()
    }
}
