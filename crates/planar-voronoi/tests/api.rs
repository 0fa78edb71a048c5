//! Public API integration tests for planar-voronoi.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use planar_voronoi::{compute, compute_with, GridPoint, VoronoiConfig, VoronoiError, MAX_COORD};

fn random_points(n: usize, extent: i64, seed: u64) -> Vec<GridPoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| GridPoint::new(rng.gen_range(0..extent), rng.gen_range(0..extent)))
        .collect()
}

fn lattice(n: i64, spacing: i64) -> Vec<GridPoint> {
    (0..n)
        .flat_map(|i| (0..n).map(move |j| GridPoint::new(i * spacing, j * spacing)))
        .collect()
}

/// Even-odd containment for a counter-clockwise ring.
fn ring_contains(ring: &[glam::DVec2], p: glam::DVec2) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[test]
fn test_compute_basic() {
    let points = random_points(500, 100_000, 12345);
    let output = compute(&points).expect("compute should succeed");

    assert_eq!(output.diagram.num_cells(), 500);
    assert!(output.diagram.num_vertices() > 0);
    assert!(
        !output.diagnostics.unbounded_cells.is_empty(),
        "hull sites must have unbounded cells"
    );
}

#[test]
fn test_compute_insufficient_points() {
    let points = vec![GridPoint::new(0, 0), GridPoint::new(10, 0)];
    let result = compute(&points);
    assert!(matches!(result, Err(VoronoiError::InsufficientPoints(2))));
}

#[test]
fn test_compute_rejects_out_of_range() {
    let points = vec![
        GridPoint::new(0, 0),
        GridPoint::new(10, 0),
        GridPoint::new(0, MAX_COORD + 1),
    ];
    let result = compute(&points);
    assert!(matches!(
        result,
        Err(VoronoiError::CoordinateOutOfRange { index: 2, .. })
    ));
}

#[test]
fn test_lattice_interior_cells_are_squares() {
    let points = lattice(5, 10);
    let output = compute(&points).expect("lattice should work");

    for (i, p) in points.iter().enumerate() {
        let interior = (1..4).contains(&(p.x / 10)) && (1..4).contains(&(p.y / 10));
        let cell = output.diagram.cell(i);
        if interior {
            assert!(!cell.unbounded, "interior site {} should be bounded", i);
            assert_eq!(cell.len(), 4, "cocircular vertices should be welded");
            assert!((cell.signed_area() - 100.0).abs() < 1e-6);
        } else {
            assert!(cell.unbounded, "hull site {} should be unbounded", i);
        }
    }
}

#[test]
fn test_bounded_cells_are_ccw_and_contain_their_site() {
    let points = random_points(400, 50_000, 777);
    let output = compute(&points).unwrap();

    let mut bounded = 0;
    for cell in output.diagram.iter_cells() {
        if cell.unbounded || cell.is_empty() {
            continue;
        }
        bounded += 1;
        assert!(cell.signed_area() > 0.0, "cell {} is not counter-clockwise", cell.generator_index);
        let ring: Vec<_> = cell.positions().collect();
        let site = output.diagram.generators[cell.generator_index].as_dvec2();
        assert!(
            ring_contains(&ring, site),
            "cell {} does not contain its generator",
            cell.generator_index
        );
    }
    assert!(bounded > 300, "most random sites should be interior, got {}", bounded);
}

#[test]
fn test_bounded_cells_tile_the_interior() {
    // Area of all bounded cells of a lattice equals the interior squares.
    let points = lattice(10, 7);
    let output = compute(&points).unwrap();
    let total: f64 = output
        .diagram
        .iter_cells()
        .filter(|c| !c.unbounded)
        .map(|c| c.signed_area())
        .sum();
    assert!((total - 64.0 * 49.0).abs() < 1e-6, "total area {}", total);
}

#[test]
fn test_duplicates_get_empty_cells() {
    let mut points = random_points(50, 10_000, 5);
    points.push(points[10]);
    let output = compute(&points).unwrap();

    assert_eq!(output.diagnostics.duplicate_generators.len(), 1);
    let (dup, original) = output.diagnostics.duplicate_generators[0];
    assert_eq!(
        points[dup], points[original],
        "duplicate must coincide with its original"
    );
    assert!(output.diagram.cells[dup].is_empty());
    assert!(!output.diagnostics.is_clean());
}

#[test]
fn test_weld_distance_is_configurable() {
    let points = lattice(4, 10);
    let output = compute_with(
        &points,
        VoronoiConfig {
            weld_distance: 0.0,
        },
    )
    .unwrap();
    // Without welding, coincident circumcentres of the split squares remain.
    let interior = output.diagram.cell(5);
    assert!(!interior.unbounded);
    assert!(interior.len() >= 4);
}

#[test]
fn test_deterministic_output() {
    let points = random_points(200, 20_000, 31);
    let a = compute(&points).unwrap();
    let b = compute(&points).unwrap();
    assert_eq!(a.diagram.cells, b.diagram.cells);
    assert_eq!(a.diagram.vertices, b.diagram.vertices);
}
