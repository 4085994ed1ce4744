//! house-price-search CLI
//!
//! # Commands
//!
//! - `train`: search every configured family and save the bundles
//! - `replay`: register saved bundles as runs in a tracking store
//! - `predict`: price one property with a saved bundle

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use house_price_search::artifact::{ArtifactStore, BundlePaths};
use house_price_search::config::PipelineConfig;
use house_price_search::frame::Record;
use house_price_search::pipeline::TrainingPipeline;
use house_price_search::replay::{ReplaySource, TrackingReplay};
use house_price_search::tracking::MemoryTrackingStore;

/// Cross-validated model search for house sale prices
#[derive(Parser)]
#[command(name = "house-price-search")]
#[command(version)]
#[command(about = "Grid-search regression models for house prices and track the results")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train every configured family and save one bundle per family
    Train {
        /// JSON pipeline config; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Parquet file overriding the config's data path
        #[arg(long)]
        data: Option<PathBuf>,
        /// Output directory overriding the config's
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Number of CV folds
        #[arg(long)]
        folds: Option<usize>,
        /// Worker threads for the search
        #[arg(long)]
        workers: Option<usize>,
        /// Seed for the split and the folds
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Replay bundles into a tracking store
    ///
    /// Each path is a model blob (its metadata is the sibling `.json`) or a
    /// directory whose `.bin` files are all replayed.
    Replay {
        /// Model blobs or bundle directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Experiment name
        #[arg(short, long, default_value = "housing_price")]
        experiment: String,
        /// Write the tracked runs to this JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Predict the price of one property
    Predict {
        /// Bundle directory
        #[arg(short, long, default_value = "models")]
        dir: PathBuf,
        /// Bundle stem
        #[arg(short, long, default_value = "selected")]
        name: String,
        /// Feature values as a JSON object, e.g. '{"bedrooms": 3, ...}'
        record: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Train {
            config,
            data,
            output_dir,
            folds,
            workers,
            seed,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_json_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if let Some(data) = data {
                config.data = data;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(k) = folds {
                config.search = config.search.folds(k);
            }
            if let Some(n) = workers {
                config.search = config.search.pool_size(n);
            }
            if let Some(seed) = seed {
                config.search = config.search.seed(seed);
            }
            train(&config)
        }
        Commands::Replay {
            paths,
            experiment,
            export,
        } => replay(&paths, &experiment, export.as_deref()),
        Commands::Predict { dir, name, record } => predict(&dir, &name, &record),
    }
}

fn train(config: &PipelineConfig) -> Result<()> {
    config.validate()?;
    let frame = TrainingPipeline::load_frame(config)
        .with_context(|| format!("reading {}", config.data.display()))?;
    let report = TrainingPipeline::from_config(config).run(&frame, &config.families())?;

    for outcome in &report.families {
        let meta = &outcome.bundle.metadata;
        println!(
            "{:<20} cv={:>14.2} rmse={:>12.2} r2={:.4}  {}",
            outcome.stem,
            meta.best_score().unwrap_or(f64::NAN),
            meta.metric("rmse").unwrap_or(f64::NAN),
            meta.metric("r2").unwrap_or(f64::NAN),
            outcome.paths.model.display()
        );
    }
    for (stem, error) in &report.failed {
        println!("{stem:<20} FAILED: {error}");
    }
    if let Some((stem, paths)) = &report.selected {
        println!("selected: {stem} -> {}", paths.model.display());
    }
    Ok(())
}

fn replay(paths: &[PathBuf], experiment: &str, export: Option<&Path>) -> Result<()> {
    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut blobs: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("listing {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
                .collect();
            blobs.sort();
            sources.extend(blobs.into_iter().map(|blob| sibling_source(&blob)));
        } else {
            sources.push(sibling_source(path));
        }
    }
    if sources.is_empty() {
        bail!("no model blobs found");
    }

    let store = MemoryTrackingStore::new(experiment);
    let report = TrackingReplay::new(&store).replay_all(&sources)?;
    info!(runs = report.runs.len(), experiment, "replay complete");
    for run in &report.runs {
        println!("{}  {}", run.run_id(), run.name());
    }
    for skipped in &report.skipped {
        println!("skipped {}: {}", skipped.source.model.display(), skipped.error);
    }
    if let Some(path) = export {
        store
            .export_json(path)
            .with_context(|| format!("exporting runs to {}", path.display()))?;
    }
    if report.is_complete() {
        Ok(())
    } else {
        bail!("{} of {} sources skipped", report.skipped.len(), sources.len())
    }
}

fn predict(dir: &Path, name: &str, record: &str) -> Result<()> {
    let values: BTreeMap<String, f64> =
        serde_json::from_str(record).context("record must be a JSON object of numbers")?;
    let bundle = ArtifactStore::new().load(&BundlePaths::in_dir(dir, name))?;
    let price = bundle.model.predict(&Record::from(values))?;
    println!("{price:.2}");
    Ok(())
}

fn sibling_source(blob: &Path) -> ReplaySource {
    ReplaySource::new(blob, blob.with_extension("json"))
}
