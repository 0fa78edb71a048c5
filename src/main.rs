use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rustc_hash::FxHashSet;

use postcode_shapes::boundary::GeoJsonBoundaries;
use postcode_shapes::config::PipelineConfig;
use postcode_shapes::hints::InlandSectors;
use postcode_shapes::ingest::{self, Partitioner};
use postcode_shapes::pipeline::Pipeline;
use postcode_shapes::postcode::load_terminated;
use postcode_shapes::storage::DirectorySink;
use postcode_shapes::Result;

/// Synthesise postcode boundary polygons from NSUL address points
#[derive(Parser, Debug)]
#[command(name = "postcode-shapes", version, about)]
struct Cli {
    /// NSUL CSV files, named NSUL_<month>_<year>_<region>.csv
    #[arg(required = true, value_name = "CSV")]
    files: Vec<PathBuf>,

    /// Region boundaries (GeoJSON FeatureCollection)
    #[arg(long, value_name = "FILE")]
    regions: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    output: PathBuf,

    /// Inland sector hints (JSON: region code -> sectors)
    #[arg(long, value_name = "FILE")]
    inland_sectors: Option<PathBuf>,

    /// ONSPD CSV listing terminated postcodes
    #[arg(long, value_name = "FILE")]
    terminated: Option<PathBuf>,

    /// Pipeline configuration (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only process postcodes starting with this prefix
    #[arg(long)]
    startswith: Option<String>,

    /// Worker threads (default: number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write .geojson.gz files
    #[arg(long)]
    gzip: bool,

    /// Stop after unit and vertical-street polygons
    #[arg(long)]
    skip_aggregation: bool,

    /// Write a run report (supports .json and .json.gz)
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every work unit succeeded and nothing was deferred.
fn run(cli: Cli) -> Result<bool> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if cli.startswith.is_some() {
        config.startswith = cli.startswith.clone();
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate()?;

    let terminated = match &cli.terminated {
        Some(path) => load_terminated(path)?,
        None => FxHashSet::default(),
    };
    let hints = match &cli.inland_sectors {
        Some(path) => InlandSectors::load(path)?,
        None => InlandSectors::default(),
    };
    let boundaries = GeoJsonBoundaries::load(&cli.regions, &config.regions)?;
    let sink = DirectorySink::new(&cli.output)?.with_gzip(cli.gzip);

    let mut partitioner =
        Partitioner::new(config.regions.clone(), config.normalizer(terminated)).with_extent(config.extent);
    ingest::ingest_files(&cli.files, &mut partitioner)?;
    let partitions = partitioner.finish();

    let pipeline = Pipeline::new(config, Arc::new(sink), Arc::new(boundaries))
        .with_inland_sectors(hints)
        .with_skip_aggregation(cli.skip_aggregation);
    let report = pipeline.run(partitions)?;

    if let Some(path) = &cli.report {
        report.write_json(path)?;
    }
    println!(
        "{} artifacts written, {} already present, {} units failed, {} aggregates deferred",
        report.totals.written(),
        report.totals.artifacts_skipped,
        report.failed_units(),
        report.deferred_units()
    );
    Ok(report.is_success())
}
