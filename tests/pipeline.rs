//! End-to-end runs of the boundary-synthesis pipeline.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use geo::{polygon, Area, MultiPolygon};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use postcode_shapes::boundary::InMemoryBoundaries;
use postcode_shapes::config::PipelineConfig;
use postcode_shapes::geometry::{validation::validate_multipolygon, InfinityRing, Projection, ReferenceBoundary};
use postcode_shapes::hints::InlandSectors;
use postcode_shapes::ingest::{GridExtent, GridPoint, Partitioner, Partitions, RawRecord, SiteTable};
use postcode_shapes::pipeline::{Pipeline, RegionUnit, WorkUnit, PHASE_AREAS, PHASE_REGIONS, PHASE_SECTORS};
use postcode_shapes::postcode::{Normalizer, PostalCode};
use postcode_shapes::region::{RegionCatalog, RegionCode};
use postcode_shapes::storage::{Artifact, ArtifactKey, ArtifactKind, DirectorySink, MemorySink, Properties, StorageSink};
use postcode_shapes::{Error, Result};

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
}

/// Region `SC` covers 90km..110km east, 190km..210km north.
fn scotland() -> MultiPolygon<f64> {
    square(90_000.0, 190_000.0, 110_000.0, 210_000.0)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        projection: Projection::Identity,
        workers: 2,
        ..PipelineConfig::default()
    }
}

fn partition(records: Vec<RawRecord>) -> Partitions {
    let mut partitioner = Partitioner::new(RegionCatalog::great_britain(), Normalizer::default());
    partitioner.extend(records);
    partitioner.finish()
}

fn record(pc: &str, x: i64, y: i64, uprn: &str) -> RawRecord {
    RawRecord::new(pc, GridPoint::new(x, y), uprn, "SC")
}

fn sample_records() -> Vec<RawRecord> {
    vec![
        record("AB1 2CD", 100_000, 200_000, "1"),
        record("AB1 2EF", 100_000, 200_000, "2"),
        record("AB1 2GH", 100_500, 200_000, "3"),
        record("AB1 2GH", 100_500, 200_400, "4"),
        record("AB1 3JK", 99_500, 200_300, "5"),
        record("AB1 3LN", 99_700, 199_200, "6"),
        record("AB12 4PQ", 101_200, 199_500, "7"),
    ]
}

fn run(records: Vec<RawRecord>, sink: Arc<dyn StorageSink>, config: PipelineConfig) -> postcode_shapes::pipeline::RunReport {
    let boundaries = InMemoryBoundaries::new().with("SC", scotland());
    Pipeline::new(config, sink, Arc::new(boundaries))
        .run(partition(records))
        .unwrap()
}

#[test]
fn test_vertical_street_is_a_composite() {
    let sink = Arc::new(MemorySink::new());
    let report = run(sample_records(), sink.clone(), config());
    assert!(report.is_success());

    assert!(sink.get(&ArtifactKey::unit("AB1 2CD")).unwrap().is_none());
    assert!(sink.get(&ArtifactKey::unit("AB1 2EF")).unwrap().is_none());

    let streets = sink.keys_of(ArtifactKind::VerticalStreet);
    assert_eq!(streets.len(), 1, "one composite for the shared coordinate");
    let street = sink.get(&streets[0]).unwrap().unwrap();
    assert_eq!(street.properties["postcodes"], "AB1 2CD, AB1 2EF");
    assert_eq!(street.properties["uprns"], "1, 2");
    assert!(street.geometry.unsigned_area() > 0.0);

    let sector = sink.get(&ArtifactKey::sector("AB1 2")).unwrap().unwrap();
    assert_eq!(sector.properties["postcodes"], "AB1 2CD, AB1 2EF, AB1 2GH");
}

#[test]
fn test_every_artifact_is_valid_and_clipped() {
    let sink = Arc::new(MemorySink::new());
    let report = run(sample_records(), sink.clone(), config());

    assert_eq!(report.totals.cells, 6);
    assert_eq!(report.totals.degenerate_cells, 0);
    assert!(report.totals.clipped > 0, "hull cells reach the ring and must be clipped");
    for artifact in sink.artifacts() {
        let check = validate_multipolygon(&artifact.geometry);
        assert!(check.is_valid(), "{}: {}", artifact.key, check.summary());
        let area = artifact.geometry.unsigned_area();
        assert!(area > 0.0 && area <= 400_000_000.0 + 1e-3, "{} area {}", artifact.key, area);
    }
}

#[test]
fn test_second_run_writes_nothing() {
    let sink = Arc::new(MemorySink::new());
    let first = run(sample_records(), sink.clone(), config());
    let written = sink.writes();
    assert_eq!(written, first.totals.written());
    assert!(written > 0);

    let second = run(sample_records(), sink.clone(), config());
    assert_eq!(sink.writes(), written, "all artifacts already exist");
    assert_eq!(second.totals.written(), 0);
    for phase in &second.phases {
        assert_eq!(phase.completed + phase.failed, 0, "{} re-ran units", phase.phase);
    }
    assert_eq!(second.phase(PHASE_REGIONS).unwrap().skipped, 1);
    assert_eq!(second.phase(PHASE_AREAS).unwrap().skipped, 1);
}

#[test]
fn test_missing_boundary_fails_before_work() {
    let sink = Arc::new(MemorySink::new());
    let mut records = sample_records();
    records.push(RawRecord::new("E1 6AN", GridPoint::new(530_000, 180_000), "9", "LN"));

    let boundaries = InMemoryBoundaries::new().with("SC", scotland());
    let result = Pipeline::new(config(), sink.clone(), Arc::new(boundaries)).run(partition(records));
    assert!(matches!(result, Err(Error::MissingReferenceBoundary(r)) if r == "LN"));
    assert_eq!(sink.writes(), 0);
}

#[test]
fn test_ambiguous_boundary_fails_before_work() {
    let sink = Arc::new(MemorySink::new());
    let boundaries = InMemoryBoundaries::new()
        .with("SC", scotland())
        .with("SC", scotland());
    let result = Pipeline::new(config(), sink.clone(), Arc::new(boundaries)).run(partition(sample_records()));
    assert!(matches!(result, Err(Error::AmbiguousReferenceBoundary { count: 2, .. })));
    assert_eq!(sink.writes(), 0);
}

fn single_site_unit(boundary: Arc<ReferenceBoundary>, hints: InlandSectors, sink: Arc<MemorySink>) -> RegionUnit {
    let mut table = SiteTable::new();
    table.add(
        GridPoint::new(100_000, 200_000),
        PostalCode::parse("AB1 2CD").unwrap(),
        "1",
    );
    RegionUnit::new(
        RegionCode::from("SC"),
        table.into_sites(),
        boundary,
        Arc::new(config()),
        Arc::new(hints),
        sink,
    )
}

#[test]
fn test_inland_site_never_clips() {
    // Boundary large enough to hold the whole ring-bounded cell.
    let huge = Arc::new(ReferenceBoundary::new(square(-5e6, -5e6, 5e6, 5e6)));
    let sink = Arc::new(MemorySink::new());
    let stats = Box::new(single_site_unit(huge.clone(), InlandSectors::default(), sink.clone()))
        .execute()
        .unwrap();
    assert_eq!(huge.intersection_count(), 0);
    assert_eq!(stats.clipped, 0);
    assert_eq!(stats.units_written, 1);

    // A coastal boundary is skipped when the sector is hinted inland...
    let hints: InlandSectors = [(RegionCode::from("SC"), "AB1 2".to_string())].into_iter().collect();
    let coastal = Arc::new(ReferenceBoundary::new(scotland()));
    let stats = Box::new(single_site_unit(coastal.clone(), hints, Arc::new(MemorySink::new())))
        .execute()
        .unwrap();
    assert_eq!(coastal.intersection_count(), 0);
    assert_eq!(stats.clipped, 0);

    // ...and used otherwise.
    let coastal = Arc::new(ReferenceBoundary::new(scotland()));
    let stats = Box::new(single_site_unit(coastal.clone(), InlandSectors::default(), Arc::new(MemorySink::new())))
        .execute()
        .unwrap();
    assert_eq!(coastal.intersection_count(), 1);
    assert_eq!(stats.clipped, 1);
}

/// Random codes from a handful of sectors of one district, with some
/// coordinates shared between codes.
fn random_records(seed: u64, n: usize) -> Vec<RawRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let letters = ["AA", "AB", "BD", "EF", "GH", "JL", "NP", "QR", "TU", "WX"];
    let mut coords: Vec<(i64, i64)> = Vec::new();
    (0..n)
        .map(|i| {
            let code = format!("AB1 {}{}", rng.gen_range(1..4), letters[rng.gen_range(0..letters.len())]);
            let (x, y) = if !coords.is_empty() && rng.gen_bool(0.1) {
                coords[rng.gen_range(0..coords.len())]
            } else {
                let c = (rng.gen_range(91_000..109_000), rng.gen_range(191_000..209_000));
                coords.push(c);
                c
            };
            record(&code, x, y, &i.to_string())
        })
        .collect()
}

#[test]
fn test_every_code_is_covered() {
    let records = random_records(7, 150);
    let expected: BTreeSet<String> = records.iter().map(|r| r.postcode.clone()).collect();

    let sink = Arc::new(MemorySink::new());
    let report = run(records, sink.clone(), config());
    assert_eq!(report.totals.degenerate_cells, 0);

    let mut covered: BTreeSet<String> = sink
        .keys_of(ArtifactKind::Unit)
        .into_iter()
        .map(|k| k.name)
        .collect();
    for key in sink.keys_of(ArtifactKind::VerticalStreet) {
        let street = sink.get(&key).unwrap().unwrap();
        let codes = street.properties["postcodes"].as_str().unwrap().to_string();
        covered.extend(codes.split(", ").map(str::to_string));
    }
    assert_eq!(covered, expected);
}

#[test]
fn test_aggregates_preserve_area() {
    let sink = Arc::new(MemorySink::new());
    let report = run(random_records(11, 80), sink.clone(), config());
    assert!(report.is_success());

    let area_of = |key: &ArtifactKey| sink.get(key).unwrap().unwrap().geometry.unsigned_area();
    let leaves: f64 = sink
        .keys_of(ArtifactKind::Unit)
        .iter()
        .chain(sink.keys_of(ArtifactKind::VerticalStreet).iter())
        .map(|k| area_of(k))
        .sum();
    let region = scotland().unsigned_area();
    let district = area_of(&ArtifactKey::district("AB1"));
    let area = area_of(&ArtifactKey::area("AB"));

    assert!((leaves - region).abs() / region < 1e-6, "cells tile the region: {} vs {}", leaves, region);
    assert!((district - leaves).abs() / leaves < 1e-6, "district {} vs units {}", district, leaves);
    assert!((area - district).abs() / district < 1e-6);
}

#[test]
fn test_disabled_ring_drops_hull_sites() {
    let records: Vec<RawRecord> = (0..3)
        .flat_map(|i| (0..3).map(move |j| (i, j)))
        .map(|(i, j)| {
            record(
                &format!("AB1 {}AA", i * 3 + j),
                100_000 + i * 1000,
                200_000 + j * 1000,
                &format!("{}", i * 3 + j),
            )
        })
        .collect();
    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig {
        ring: InfinityRing::disabled(),
        ..config()
    };
    let report = run(records, sink.clone(), config);

    assert_eq!(report.totals.degenerate_cells, 8);
    assert_eq!(sink.keys_of(ArtifactKind::Unit), vec![ArtifactKey::unit("AB1 4AA")]);
}

#[test]
fn test_cross_region_code_is_flagged() {
    let mut records = sample_records();
    records.push(RawRecord::new("AB1 2GH", GridPoint::new(200_000, 300_000), "8", "NE"));
    let report = run(records, Arc::new(MemorySink::new()), config());
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].postcode, "AB1 2GH");
    assert_eq!(report.ingest.cross_region, 1);
}

#[test]
fn test_directory_sink_layout() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(DirectorySink::new(dir.path()).unwrap());
    let report = run(sample_records(), sink.clone(), config());
    assert!(report.is_success());

    let root = dir.path();
    assert!(root.join("postcodes/AB1/AB1_2GH.geojson").is_file());
    assert!(!root.join("postcodes/AB1/AB1_2CD.geojson").exists());
    assert!(root
        .join("vertical-streets/100000,200000-AB1_2CD,AB1_2EF.geojson")
        .is_file());
    assert!(root.join("sectors/AB1_2.geojson").is_file());
    assert!(root.join("districts/AB12.geojson").is_file());
    assert!(root.join("areas/AB.geojson").is_file());
    assert_eq!(sink.writes(), report.totals.written());
}

/// A memory sink whose writes of one key fail until disarmed.
struct FailingSink {
    inner: Arc<MemorySink>,
    key: ArtifactKey,
    armed: AtomicBool,
}

impl FailingSink {
    fn new(inner: Arc<MemorySink>, key: ArtifactKey) -> Self {
        Self {
            inner,
            key,
            armed: AtomicBool::new(true),
        }
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl StorageSink for FailingSink {
    fn put(&self, key: &ArtifactKey, geometry: &MultiPolygon<f64>, properties: &Properties) -> Result<()> {
        if self.armed.load(Ordering::SeqCst) && *key == self.key {
            return Err(Error::Storage(format!("{}: disk full", key)));
        }
        self.inner.put(key, geometry, properties)
    }

    fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        self.inner.exists(key)
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        self.inner.get(key)
    }
}

#[test]
fn test_failed_region_defers_aggregates_until_resume() {
    let memory = Arc::new(MemorySink::new());
    let sink = Arc::new(FailingSink::new(memory.clone(), ArtifactKey::unit("AB1 2GH")));

    let first = run(sample_records(), sink.clone(), config());
    assert!(!first.is_success());
    assert_eq!(first.phase(PHASE_REGIONS).unwrap().failed, 1);
    assert_eq!(first.totals.failed_writes, ["unit/AB1 2GH"]);
    assert!(
        memory.get(&ArtifactKey::unit("AB1 3JK")).unwrap().is_some(),
        "the rest of the region is still written"
    );
    assert_eq!(memory.keys_of(ArtifactKind::VerticalStreet).len(), 1);
    assert_eq!(first.phase(PHASE_SECTORS).unwrap().deferred.len(), 3);
    assert_eq!(first.deferred_units(), 6, "3 sectors, 2 districts and 1 area wait");
    for kind in [ArtifactKind::Sector, ArtifactKind::District, ArtifactKind::Area] {
        assert!(memory.keys_of(kind).is_empty(), "no {} built from partial inputs", kind);
    }

    sink.disarm();
    let second = run(sample_records(), sink.clone(), config());
    assert!(second.is_success());
    assert_eq!(second.totals.units_written, 1, "only the missing unit is written");
    assert_eq!(second.totals.vertical_streets_written, 0);

    let area_of = |key: &ArtifactKey| memory.get(key).unwrap().unwrap().geometry.unsigned_area();
    let children = area_of(&ArtifactKey::unit("AB1 2GH"))
        + area_of(&ArtifactKey::vertical_street(100_000, 200_000, &["AB1 2CD", "AB1 2EF"]));
    let sector = area_of(&ArtifactKey::sector("AB1 2"));
    assert!(
        (sector - children).abs() / children < 1e-6,
        "sector {} covers all of its children {}",
        sector,
        children
    );
    assert_eq!(memory.keys_of(ArtifactKind::Area), vec![ArtifactKey::area("AB")]);
}

#[test]
fn test_long_vertical_street_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(DirectorySink::new(dir.path()).unwrap());
    let codes: Vec<String> = (0..40u8)
        .map(|i| format!("AB1 4{}{}", (b'A' + i / 26) as char, (b'A' + i % 26) as char))
        .collect();
    let mut records = sample_records();
    records.extend(
        codes
            .iter()
            .enumerate()
            .map(|(i, code)| record(code, 101_000, 201_000, &format!("v{}", i))),
    );

    let report = run(records, sink.clone(), config());
    assert!(report.is_success(), "{:?}", report.phases[0].failures);
    assert!(dir.path().join("postcodes/AB1/AB1_2GH.geojson").is_file());

    let key = ArtifactKey::vertical_street(101_000, 201_000, &codes);
    let path = sink.path_for(&key);
    assert!(path.file_name().unwrap().len() < 255);
    assert!(path.is_file());
    let street = sink.get(&key).unwrap().unwrap();
    assert_eq!(street.properties["postcodes"], codes.join(", "), "full code list is kept");
    assert!(sink.exists(&ArtifactKey::sector("AB1 4")).unwrap());
}

#[test]
fn test_outlier_coordinate_is_rejected_at_ingestion() {
    let mut records = sample_records();
    records.push(record("AB1 9ZZ", 9_000_000, 200_000, "8"));

    let sink = Arc::new(MemorySink::new());
    let report = run(records.clone(), sink.clone(), config());
    assert!(report.is_success());
    assert_eq!(report.ingest.out_of_extent, 1);
    assert!(sink.get(&ArtifactKey::unit("AB1 9ZZ")).unwrap().is_none());
    assert!(sink.get(&ArtifactKey::unit("AB1 2GH")).unwrap().is_some());

    // Accepted under a wider extent, the distant site still tessellates.
    let wide = GridExtent {
        min_e: 0,
        min_n: 0,
        max_e: 10_000_000,
        max_n: 10_000_000,
    };
    let mut partitioner = Partitioner::new(RegionCatalog::great_britain(), Normalizer::default()).with_extent(wide);
    partitioner.extend(records);
    let config = PipelineConfig {
        extent: wide,
        ..config()
    };
    let sink = Arc::new(MemorySink::new());
    let boundaries = InMemoryBoundaries::new().with("SC", scotland());
    let report = Pipeline::new(config, sink.clone(), Arc::new(boundaries))
        .run(partitioner.finish())
        .unwrap();
    assert_eq!(report.phase(PHASE_REGIONS).unwrap().failed, 0);
    assert!(sink.get(&ArtifactKey::unit("AB1 2GH")).unwrap().is_some());
    assert!(sink.get(&ArtifactKey::unit("AB1 9ZZ")).unwrap().is_some());
}

#[test]
fn test_unrepairable_child_is_written_best_effort() {
    let sink = Arc::new(MemorySink::new());
    // A stored unit that collapsed to a line; the region leaves it in place.
    let collapsed = MultiPolygon::new(vec![polygon![
        (x: 101_200.0, y: 199_500.0),
        (x: 101_300.0, y: 199_600.0),
        (x: 101_400.0, y: 199_700.0),
    ]]);
    sink.put(&ArtifactKey::unit("AB12 4PQ"), &collapsed, &Properties::new())
        .unwrap();

    let report = run(sample_records(), sink.clone(), config());
    assert!(report.is_success(), "degraded output is not a failure");
    assert!(report.totals.artifacts_skipped >= 1);
    assert!(report.totals.degraded >= 1);
    assert!(
        report.totals.degraded_keys.iter().any(|k| k == "sector/AB12 4"),
        "{:?}",
        report.totals.degraded_keys
    );
    assert!(sink.exists(&ArtifactKey::sector("AB12 4")).unwrap());
    assert!(sink.exists(&ArtifactKey::area("AB")).unwrap());
}
