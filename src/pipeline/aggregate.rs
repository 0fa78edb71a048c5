//! Bottom-up union of stored artifacts into sectors, districts and areas.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use geo::MultiPolygon;
use serde_json::json;

use super::executor::WorkUnit;
use super::report::UnitStats;
use super::vertical;
use crate::constants::{LABEL_ELLIPSIS, LABEL_SEPARATOR};
use crate::geometry::{ensure_valid, union_all, ClipFlags};
use crate::ingest::Partitions;
use crate::postcode::{area_of, district_of_sector, PostalCode};
use crate::region::RegionCode;
use crate::storage::{ArtifactKey, ArtifactKind, Properties, StorageSink};
use crate::{Error, Result};

/// Join `codes` with `", "`, keeping whole codes only. When the full list
/// exceeds `budget` characters, as many codes as fit are kept and `", ..."`
/// is appended; the marker counts toward the budget.
pub fn aggregate_label<S: AsRef<str>>(codes: &[S], budget: usize) -> String {
    let full = codes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(LABEL_SEPARATOR);
    if full.len() <= budget {
        return full;
    }

    let marker = LABEL_SEPARATOR.len() + LABEL_ELLIPSIS.len();
    let mut label = String::new();
    for code in codes.iter().map(AsRef::as_ref) {
        let sep = if label.is_empty() { 0 } else { LABEL_SEPARATOR.len() };
        if label.len() + sep + code.len() + marker > budget {
            break;
        }
        if sep > 0 {
            label.push_str(LABEL_SEPARATOR);
        }
        label.push_str(code);
    }
    if label.is_empty() {
        return LABEL_ELLIPSIS.to_string();
    }
    label.push_str(LABEL_SEPARATOR);
    label.push_str(LABEL_ELLIPSIS);
    label
}

/// Union `parts`; if the boolean union fails, keep the parts side by side
/// and mark the result degraded.
pub(crate) fn merge_parts(parts: Vec<MultiPolygon<f64>>, label: &str, flags: &mut ClipFlags) -> MultiPolygon<f64> {
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_else(|| MultiPolygon::new(Vec::new()));
    }
    let fallback: Vec<_> = parts.iter().flat_map(|p| p.0.iter().cloned()).collect();
    match union_all(parts) {
        Ok(merged) => merged,
        Err(detail) => {
            log::warn!(
                "{}",
                Error::GeometryRepairFailure {
                    key: label.to_string(),
                    detail: format!("union failed: {}", detail),
                }
            );
            flags.degraded = true;
            MultiPolygon::new(fallback)
        }
    }
}

/// One sector, district or area to build.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub key: ArtifactKey,
    /// Child artifacts, in canonical key order.
    pub children: Vec<ArtifactKey>,
    /// Display label: the constituent codes, truncated to the budget.
    pub label: String,
    pub code_count: usize,
    /// Regions whose sites feed this aggregate.
    pub regions: Vec<RegionCode>,
}

#[derive(Default)]
struct Group<'a> {
    children: BTreeSet<ArtifactKey>,
    codes: BTreeSet<&'a PostalCode>,
    regions: BTreeSet<&'a RegionCode>,
}

impl<'a> Group<'a> {
    fn into_node(self, key: ArtifactKey, budget: usize) -> AggregateNode {
        let codes: Vec<&str> = self.codes.iter().map(|c| c.as_str()).collect();
        AggregateNode {
            key,
            children: self.children.into_iter().collect(),
            label: aggregate_label(&codes, budget),
            code_count: codes.len(),
            regions: self.regions.into_iter().cloned().collect(),
        }
    }
}

/// Which artifacts every aggregate is built from.
///
/// Membership follows the postcode hierarchy only: a sector's children are
/// the unit artifacts of its codes plus every vertical-street composite
/// carrying one of its codes.
#[derive(Debug, Clone, Default)]
pub struct HierarchyPlan {
    sectors: Vec<AggregateNode>,
    districts: Vec<AggregateNode>,
    areas: Vec<AggregateNode>,
}

impl HierarchyPlan {
    pub fn build(partitions: &Partitions, label_budget: usize) -> Self {
        let mut sectors: BTreeMap<&str, Group> = BTreeMap::new();
        for (region, table) in &partitions.regions {
            for site in table.sites() {
                if let Some(code) = site.single_code() {
                    let group = sectors.entry(code.sector()).or_default();
                    group.children.insert(ArtifactKey::unit(code.as_str()));
                    group.codes.insert(code);
                    group.regions.insert(region);
                }
            }
            for street in vertical::resolve(table.sites()) {
                let key = street.key();
                for code in &street.site.postcodes {
                    let group = sectors.entry(code.sector()).or_default();
                    group.children.insert(key.clone());
                    group.codes.insert(code);
                    group.regions.insert(region);
                }
            }
        }

        let mut districts: BTreeMap<&str, Group> = BTreeMap::new();
        for (&sector, group) in &sectors {
            let parent = districts.entry(district_of_sector(sector)).or_default();
            parent.children.insert(ArtifactKey::sector(sector));
            parent.codes.extend(group.codes.iter().copied());
            parent.regions.extend(group.regions.iter().copied());
        }

        let mut areas: BTreeMap<&str, Group> = BTreeMap::new();
        for (&district, group) in &districts {
            let parent = areas.entry(area_of(district)).or_default();
            parent.children.insert(ArtifactKey::district(district));
            parent.codes.extend(group.codes.iter().copied());
            parent.regions.extend(group.regions.iter().copied());
        }

        let finish = |groups: BTreeMap<&str, Group>, kind: ArtifactKind| -> Vec<AggregateNode> {
            groups
                .into_iter()
                .map(|(name, group)| group.into_node(ArtifactKey::new(kind, name), label_budget))
                .collect()
        };
        let plan = Self {
            sectors: finish(sectors, ArtifactKind::Sector),
            districts: finish(districts, ArtifactKind::District),
            areas: finish(areas, ArtifactKind::Area),
        };
        log::info!(
            "Hierarchy: {} sectors, {} districts, {} areas",
            plan.sectors.len(),
            plan.districts.len(),
            plan.areas.len()
        );
        plan
    }

    /// Nodes of one aggregate level. Unit-level kinds have none.
    pub fn level(&self, kind: ArtifactKind) -> &[AggregateNode] {
        match kind {
            ArtifactKind::Sector => &self.sectors,
            ArtifactKind::District => &self.districts,
            ArtifactKind::Area => &self.areas,
            ArtifactKind::Unit | ArtifactKind::VerticalStreet => &[],
        }
    }

    /// Work units for one level.
    ///
    /// A node is deferred instead when one of its regions failed or one of
    /// its children is in `blocked`. Deferred keys join `blocked` so their
    /// parents wait as well; a later run builds them once every input has
    /// been written.
    pub fn ready_units(
        &self,
        kind: ArtifactKind,
        sink: &Arc<dyn StorageSink>,
        failed_regions: &BTreeSet<RegionCode>,
        blocked: &mut BTreeSet<ArtifactKey>,
    ) -> (Vec<Box<dyn WorkUnit>>, Vec<ArtifactKey>) {
        let mut ready: Vec<Box<dyn WorkUnit>> = Vec::new();
        let mut deferred = Vec::new();
        for node in self.level(kind) {
            let waiting = node.regions.iter().any(|r| failed_regions.contains(r))
                || node.children.iter().any(|c| blocked.contains(c));
            if waiting {
                log::warn!("{}: inputs incomplete after failures; deferred to the next run", node.key);
                deferred.push(node.key.clone());
            } else {
                ready.push(Box::new(AggregateUnit::new(node.clone(), Arc::clone(sink))));
            }
        }
        blocked.extend(deferred.iter().cloned());
        (ready, deferred)
    }
}

/// Builds one aggregate from its stored children.
pub struct AggregateUnit {
    node: AggregateNode,
    sink: Arc<dyn StorageSink>,
}

impl AggregateUnit {
    pub fn new(node: AggregateNode, sink: Arc<dyn StorageSink>) -> Self {
        Self { node, sink }
    }
}

impl WorkUnit for AggregateUnit {
    fn name(&self) -> String {
        self.node.key.to_string()
    }

    fn is_complete(&self) -> Result<bool> {
        self.sink.exists(&self.node.key)
    }

    fn execute(self: Box<Self>) -> Result<UnitStats> {
        let AggregateUnit { node, sink } = *self;
        let name = node.key.to_string();
        let mut stats = UnitStats::default();

        let mut parts = Vec::with_capacity(node.children.len());
        for child in &node.children {
            match sink.get(child)? {
                Some(artifact) => parts.push(artifact.geometry),
                None => {
                    log::debug!("{}: child {} not found", name, child);
                    stats.missing_children += 1;
                }
            }
        }
        if parts.is_empty() {
            log::warn!("{}: none of {} children exist; nothing written", name, node.children.len());
            stats.empty_aggregates += 1;
            return Ok(stats);
        }
        if stats.missing_children > 0 {
            log::warn!(
                "{}: {} of {} children missing",
                name,
                stats.missing_children,
                node.children.len()
            );
        }

        let mut flags = ClipFlags::default();
        let geometry = merge_parts(parts, &name, &mut flags);
        let geometry = ensure_valid(geometry, &name, &mut flags);
        stats.record_clip(flags);
        if flags.degraded {
            stats.degraded_keys.push(name.clone());
        }

        let mut properties = Properties::new();
        properties.insert("name".into(), json!(node.key.name));
        properties.insert("postcodes".into(), json!(node.label));
        sink.put(&node.key, &geometry, &properties)?;
        stats.aggregates_written += 1;
        log::debug!("{}: union of {} children ({} codes)", name, node.children.len(), node.code_count);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{GridPoint, SiteTable};
    use crate::region::RegionCode;
    use crate::storage::MemorySink;
    use geo::{polygon, Area};

    #[test]
    fn test_label_fits() {
        assert_eq!(aggregate_label(&["AB1 2CD", "AB1 2EF"], 100), "AB1 2CD, AB1 2EF");
        assert_eq!(aggregate_label::<&str>(&[], 10), "");
    }

    #[test]
    fn test_label_truncates_whole_codes() {
        let codes = ["AB1 2CD", "AB1 2EF", "AB1 2GH", "AB1 2JK"];
        // "AB1 2CD, AB1 2EF, ..." is 21 characters.
        assert_eq!(aggregate_label(&codes, 21), "AB1 2CD, AB1 2EF, ...");
        assert_eq!(aggregate_label(&codes, 25), "AB1 2CD, AB1 2EF, ...");
        assert_eq!(aggregate_label(&codes, 12), "AB1 2CD, ...");
        assert_eq!(aggregate_label(&codes, 8), "...");
        for budget in 5..40 {
            assert!(aggregate_label(&codes, budget).len() <= budget);
        }
    }

    fn code(s: &str) -> PostalCode {
        PostalCode::parse(s).unwrap()
    }

    fn partitions() -> Partitions {
        let mut table = SiteTable::new();
        table.add(GridPoint::new(0, 0), code("AB1 2CD"), "1");
        table.add(GridPoint::new(10, 0), code("AB1 2CD"), "2");
        table.add(GridPoint::new(20, 0), code("AB1 3EF"), "3");
        table.add(GridPoint::new(30, 0), code("AB12 1GH"), "4");
        table.add(GridPoint::new(40, 0), code("AB1 2JK"), "5");
        table.add(GridPoint::new(40, 0), code("AB1 3LM"), "6");
        let mut partitions = Partitions::default();
        partitions.regions.insert(RegionCode::from("SC"), table);
        partitions
    }

    #[test]
    fn test_plan_membership() {
        let plan = HierarchyPlan::build(&partitions(), 1000);

        let sectors: Vec<String> = plan.level(ArtifactKind::Sector).iter().map(|n| n.key.to_string()).collect();
        assert_eq!(sectors, ["sector/AB1 2", "sector/AB1 3", "sector/AB12 1"]);

        let ab1_2 = &plan.level(ArtifactKind::Sector)[0];
        let children: Vec<String> = ab1_2.children.iter().map(ToString::to_string).collect();
        assert_eq!(
            children,
            ["unit/AB1 2CD", "vertical-street/40,0-AB1 2JK,AB1 3LM"],
            "units come from single-code sites; the composite belongs to both sectors"
        );
        assert_eq!(ab1_2.label, "AB1 2CD, AB1 2JK");
        assert_eq!(plan.level(ArtifactKind::Sector)[1].children.len(), 2);

        let districts = plan.level(ArtifactKind::District);
        assert_eq!(districts.len(), 2);
        assert_eq!(districts[0].key, ArtifactKey::district("AB1"));
        assert_eq!(districts[0].children, vec![ArtifactKey::sector("AB1 2"), ArtifactKey::sector("AB1 3")]);
        assert_eq!(districts[0].code_count, 4);

        let areas = plan.level(ArtifactKind::Area);
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].children, vec![ArtifactKey::district("AB1"), ArtifactKey::district("AB12")]);
        assert_eq!(areas[0].code_count, 5);
        assert_eq!(areas[0].regions, vec![RegionCode::from("SC")]);
        assert!(plan.level(ArtifactKind::Unit).is_empty());
    }

    #[test]
    fn test_failed_inputs_defer_the_chain() {
        let plan = HierarchyPlan::build(&partitions(), 1000);
        let sink: Arc<dyn StorageSink> = Arc::new(MemorySink::new());
        let mut blocked = BTreeSet::new();

        let failed: BTreeSet<RegionCode> = [RegionCode::from("SC")].into_iter().collect();
        let (ready, deferred) = plan.ready_units(ArtifactKind::Sector, &sink, &failed, &mut blocked);
        assert!(ready.is_empty());
        assert_eq!(deferred.len(), 3);
        let (ready, deferred) = plan.ready_units(ArtifactKind::District, &sink, &BTreeSet::new(), &mut blocked);
        assert!(ready.is_empty(), "districts wait for deferred sectors");
        assert_eq!(deferred.len(), 2);

        // A single failed sector only holds back its own ancestors.
        let mut blocked: BTreeSet<ArtifactKey> = [ArtifactKey::sector("AB12 1")].into_iter().collect();
        let (ready, deferred) = plan.ready_units(ArtifactKind::District, &sink, &BTreeSet::new(), &mut blocked);
        assert_eq!(ready.len(), 1);
        assert_eq!(deferred, vec![ArtifactKey::district("AB12")]);
        let (ready, deferred) = plan.ready_units(ArtifactKind::Area, &sink, &BTreeSet::new(), &mut blocked);
        assert!(ready.is_empty());
        assert_eq!(deferred, vec![ArtifactKey::area("AB")]);
    }

    #[test]
    fn test_aggregate_unit_unions_children() {
        let sink: Arc<dyn StorageSink> = Arc::new(MemorySink::new());
        let left = MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]]);
        let right = MultiPolygon::new(vec![polygon![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0)]]);
        sink.put(&ArtifactKey::unit("AB1 2CD"), &left, &Properties::new()).unwrap();
        sink.put(&ArtifactKey::unit("AB1 2EF"), &right, &Properties::new()).unwrap();

        let node = AggregateNode {
            key: ArtifactKey::sector("AB1 2"),
            children: vec![
                ArtifactKey::unit("AB1 2CD"),
                ArtifactKey::unit("AB1 2EF"),
                ArtifactKey::unit("AB1 2GH"),
            ],
            label: "AB1 2CD, AB1 2EF, AB1 2GH".into(),
            code_count: 3,
            regions: vec![RegionCode::from("SC")],
        };
        let unit = Box::new(AggregateUnit::new(node, Arc::clone(&sink)));
        assert!(!unit.is_complete().unwrap());
        let stats = unit.execute().unwrap();
        assert_eq!(stats.aggregates_written, 1);
        assert_eq!(stats.missing_children, 1);

        let sector = sink.get(&ArtifactKey::sector("AB1 2")).unwrap().unwrap();
        assert!((sector.geometry.unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(sector.properties["name"], json!("AB1 2"));
        assert_eq!(sector.properties["postcodes"], json!("AB1 2CD, AB1 2EF, AB1 2GH"));
    }

    #[test]
    fn test_aggregate_without_children_writes_nothing() {
        let memory = Arc::new(MemorySink::new());
        let sink: Arc<dyn StorageSink> = memory.clone();
        let node = AggregateNode {
            key: ArtifactKey::district("ZZ9"),
            children: vec![ArtifactKey::sector("ZZ9 1")],
            label: String::new(),
            code_count: 0,
            regions: Vec::new(),
        };
        let stats = Box::new(AggregateUnit::new(node, sink)).execute().unwrap();
        assert_eq!(stats.empty_aggregates, 1);
        assert_eq!(memory.writes(), 0);
    }
}
