use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn, Level};

use wildfire_etl::raster::open_band_info;
use wildfire_etl::{BandSelector, GdalTools, Pipeline, PipelineConfig, RunSummary};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (every key is optional)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the input data tree
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    #[arg(long)]
    start_year: Option<i32>,

    #[arg(long)]
    end_year: Option<i32>,

    /// Seed for non-fire point generation
    #[arg(long)]
    seed: Option<u64>,

    /// Log at DEBUG level
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and reproject the boundary, clip the fuel raster
    Prepare,
    /// Build the filled climate stack of every month
    Climate,
    /// Count, generate, sample and export fire / non-fire points
    Points,
    /// Run prepare, climate and points in order
    All,
    /// Print the band indices an archive holds for one month
    Bands {
        #[arg(long, value_name = "FILE")]
        archive: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
    },
}

fn init_logging(args: &Args) -> Result<()> {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level);

    match &args.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {:?}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => PipelineConfig::default(),
    };

    if let Some(base_dir) = &args.base_dir {
        config.base_dir = base_dir.clone();
    }
    if let Some(start_year) = args.start_year {
        config.start_year = start_year;
    }
    if let Some(end_year) = args.end_year {
        config.end_year = end_year;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn report(stage: &str, summary: &RunSummary) {
    info!(
        "{}: {} months exported, {} skipped, {} failed",
        stage,
        summary.exported.len(),
        summary.skipped,
        summary.failed
    );
    if summary.failed > 0 {
        warn!("{} months failed; see errors above", summary.failed);
    }
}

fn build_pipeline(config: PipelineConfig) -> Result<Pipeline<GdalTools>> {
    info!(
        "Processing {}-{} under {:?}",
        config.start_year, config.end_year, config.base_dir
    );
    Ok(Pipeline::new(config, GdalTools::new())?)
}

fn print_bands(config: &PipelineConfig, archive: &Path, year: i32, month: u32) -> Result<()> {
    let bands = open_band_info(archive)
        .with_context(|| format!("Failed to read band metadata from {:?}", archive))?;
    let selector = BandSelector::new(config.climate.cumulative_keywords.iter().cloned());
    let selected = selector.select(&bands, year, month);
    let indices: Vec<String> = selected.iter().map(ToString::to_string).collect();
    println!("{}", indices.join(" "));
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let start_time = std::time::Instant::now();
    let config = load_config(&args)?;

    match &args.command {
        Command::Bands {
            archive,
            year,
            month,
        } => print_bands(&config, archive, *year, *month)?,
        Command::Prepare => {
            build_pipeline(config)?
                .prepare()
                .context("Preparation failed")?;
        }
        Command::Climate => report("Climate", &build_pipeline(config)?.run_climate()),
        Command::Points => {
            let pipeline = build_pipeline(config)?;
            let summary = pipeline.run_points().context("Point stage failed")?;
            report("Points", &summary);
            info!("Combined CSV: {:?}", pipeline.layout().combined_csv());
        }
        Command::All => {
            let summary = build_pipeline(config)?
                .run_all()
                .context("Pipeline failed")?;
            report("Climate", &summary.climate);
            report("Points", &summary.points);
        }
    }

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}
