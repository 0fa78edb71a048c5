//! Vertical streets: several postcodes sharing one coordinate.
//!
//! Such a site keeps its single Voronoi cell. The cell is emitted as one
//! composite artifact naming every code, instead of being credited to any
//! one of them.

use std::collections::BTreeSet;

use serde_json::json;

use crate::constants::LABEL_SEPARATOR;
use crate::ingest::Site;
use crate::region::RegionCode;
use crate::storage::{ArtifactKey, Properties};

#[derive(Debug, Clone, Copy)]
pub struct VerticalStreet<'a> {
    pub site_index: usize,
    pub site: &'a Site,
}

impl<'a> VerticalStreet<'a> {
    pub fn key(&self) -> ArtifactKey {
        let codes: Vec<&str> = self.site.postcodes.iter().map(|c| c.as_str()).collect();
        ArtifactKey::vertical_street(self.site.coordinate.x, self.site.coordinate.y, &codes)
    }

    /// Sorted codes joined with `", "`, e.g. `AB1 2CD, AB1 2EF`.
    pub fn label(&self) -> String {
        join(self.site.postcodes.iter().map(|c| c.as_str()))
    }

    pub fn outcodes(&self) -> BTreeSet<&'a str> {
        self.site.postcodes.iter().map(|c| c.outcode()).collect()
    }

    pub fn sectors(&self) -> BTreeSet<&'a str> {
        self.site.postcodes.iter().map(|c| c.sector()).collect()
    }

    pub fn properties(&self, region: &RegionCode) -> Properties {
        let mut properties = Properties::new();
        properties.insert("postcodes".into(), json!(self.label()));
        properties.insert(
            "uprns".into(),
            json!(join(self.site.property_references.iter().map(String::as_str))),
        );
        properties.insert("region_codes".into(), json!(region.as_str()));
        properties
    }
}

fn join<'s>(items: impl Iterator<Item = &'s str>) -> String {
    items.collect::<Vec<_>>().join(LABEL_SEPARATOR)
}

/// Every vertical street among `sites`, in site order.
pub fn resolve(sites: &[Site]) -> impl Iterator<Item = VerticalStreet<'_>> {
    sites
        .iter()
        .enumerate()
        .filter(|(_, site)| site.is_vertical_street())
        .map(|(site_index, site)| VerticalStreet { site_index, site })
}
