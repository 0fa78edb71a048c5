//! Benchmark region tessellation and clipping at national scales.
//!
//! Run with: cargo run --release --bin bench_tessellation
//!
//! Usage:
//!   bench_tessellation              Run default size (100k)
//!   bench_tessellation 100k 500k 1m Run multiple sizes
//!   bench_tessellation --no-ring    Tessellate without the infinity ring
//!   bench_tessellation -n 10        Run 10 iterations (for profiling)

use std::time::Instant;

use clap::Parser;
use geo::{polygon, MultiPolygon};
use postcode_shapes::constants::DEFAULT_WELD_DISTANCE;
use postcode_shapes::geometry::{tessellate, InfinityRing, Projection, ReferenceBoundary, RegionClipper, TessellationInput};
use postcode_shapes::ingest::GridPoint;
use postcode_shapes::util::Timed;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

fn parse_count(s: &str) -> Result<usize, String> {
    let s = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('m') {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix('k') {
        (n, 1_000)
    } else {
        (s.as_str(), 1)
    };

    num_str
        .parse::<f64>()
        .map(|n| (n * multiplier as f64) as usize)
        .map_err(|e| format!("Invalid number '{}': {}", s, e))
}

#[derive(Parser)]
#[command(name = "bench_tessellation")]
#[command(about = "Benchmark per-region tessellation and clipping")]
struct Args {
    /// Site counts to benchmark (e.g., 100k, 1m)
    #[arg(value_parser = parse_count)]
    sizes: Vec<usize>,

    /// Random seed
    #[arg(short, long, default_value_t = 12345)]
    seed: u64,

    /// Side of the square region in metres
    #[arg(long, default_value_t = 200_000)]
    extent: i64,

    /// Disable the infinity ring
    #[arg(long)]
    no_ring: bool,

    /// Also clip every cell against the region square
    #[arg(long)]
    clip: bool,

    /// Number of iterations to run (useful for profiling)
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: usize,
}

/// Random sites in a square region centred on central England.
fn generate_sites(n: usize, extent: i64, seed: u64) -> Vec<GridPoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (x0, y0) = (400_000 - extent / 2, 300_000 - extent / 2);
    (0..n)
        .map(|_| GridPoint::new(x0 + rng.gen_range(0..extent), y0 + rng.gen_range(0..extent)))
        .collect()
}

fn format_rate(count: usize, ms: f64) -> String {
    if ms <= 0.0 {
        return "N/A".to_string();
    }
    let per_sec = count as f64 / (ms / 1000.0);
    if per_sec >= 1_000_000.0 {
        format!("{:.2}M/s", per_sec / 1_000_000.0)
    } else if per_sec >= 1_000.0 {
        format!("{:.1}k/s", per_sec / 1000.0)
    } else {
        format!("{:.0}/s", per_sec)
    }
}

fn region_square(extent: i64) -> MultiPolygon<f64> {
    let (x0, y0) = ((400_000 - extent / 2) as f64, (300_000 - extent / 2) as f64);
    let (x1, y1) = (x0 + extent as f64, y0 + extent as f64);
    MultiPolygon::new(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    println!("Region Tessellation Benchmark");
    println!("=============================\n");

    let sizes = if args.sizes.is_empty() {
        vec![100_000]
    } else {
        args.sizes.clone()
    };
    let ring = if args.no_ring {
        InfinityRing::disabled()
    } else {
        InfinityRing::default()
    };

    for &n in &sizes {
        let sites = generate_sites(n, args.extent, args.seed);
        for iteration in 0..args.repeat.max(1) {
            let _t = Timed::debug(format!("iteration {}", iteration));
            let input = TessellationInput::new(sites.clone(), &ring);

            let t0 = Instant::now();
            let tessellation = match tessellate(&input, DEFAULT_WELD_DISTANCE) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("n={}: tessellation failed: {}", n, e);
                    break;
                }
            };
            let tess_ms = t0.elapsed().as_secs_f64() * 1000.0;

            print!(
                "n={:>8}  tessellate {:>9.1}ms ({:>9})  degenerate {:>6}",
                n,
                tess_ms,
                format_rate(n, tess_ms),
                tessellation.degenerate_count()
            );

            if args.clip {
                let boundary = ReferenceBoundary::new(region_square(args.extent));
                let clipper = RegionClipper::new(&boundary, Projection::Identity);
                let t1 = Instant::now();
                let clipped = tessellation
                    .cells()
                    .par_iter()
                    .flatten()
                    .map(|cell| clipper.clip_cell(cell, false, "bench"))
                    .filter(|outcome| outcome.flags.clipped)
                    .count();
                let clip_ms = t1.elapsed().as_secs_f64() * 1000.0;
                print!("  clip {:>9.1}ms ({} clipped)", clip_ms, clipped);
            }
            println!();
        }
    }
}
