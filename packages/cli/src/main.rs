#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line runner for the store income enrichment pipeline.
//!
//! Loads a store point layer from `GeoJSON`, loads census income
//! polygons from a file or a registered `ArcGIS` source, runs the
//! enrichment, and writes the map layers as `GeoJSON` files.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use geojson::FeatureCollection;
use store_income_enrich::layer::{self, LoadedLayer};
use store_income_enrich::{DEFAULT_CONFIG_TOML, parse_config, run_pipeline};
use store_income_enrich_models::config::EnrichConfig;
use store_income_enrich_models::{EnrichWarning, IncomeArea, Store};
use store_income_source::registry;

/// Income source used when neither `--income` nor `--source` is given.
const DEFAULT_SOURCE_ID: &str = "acs_median_income";

#[derive(Parser)]
#[command(name = "store_income", about = "Store income enrichment tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich stores with nearby census income and write map layers
    Run(RunArgs),
    /// List registered income sources
    Sources,
    /// Print the annotated default configuration
    DefaultConfig,
}

#[derive(Args)]
struct RunArgs {
    /// Store points `GeoJSON` file
    #[arg(long)]
    stores: PathBuf,

    /// Income polygons `GeoJSON` file (instead of fetching a source)
    #[arg(long, conflicts_with = "source")]
    income: Option<PathBuf>,

    /// Registered income source to fetch
    #[arg(long)]
    source: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Buffer radius in miles
    #[arg(long)]
    radius_miles: Option<f64>,

    /// Minimum average income for a store to qualify
    #[arg(long)]
    threshold: Option<f64>,

    /// Projected reference for buffering and joining (e.g. `EPSG:5070`)
    #[arg(long)]
    working_crs: Option<String>,

    /// Reference assumed for layers that declare none (empty to disable)
    #[arg(long)]
    default_crs: Option<String>,

    /// Directory the output layers are written to
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::Sources => {
            for source in registry::all_sources() {
                println!("{:<24} {} ({})", source.id, source.name, source.crs);
            }
        }
        Commands::DefaultConfig => print!("{DEFAULT_CONFIG_TOML}"),
    }

    Ok(())
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;

    let stores = load_stores(&args.stores, &config)?;
    let income = match &args.income {
        Some(path) => load_income_file(path)?,
        None => fetch_income(args.source.as_deref().unwrap_or(DEFAULT_SOURCE_ID)).await?,
    };

    let mut output = run_pipeline(&stores.layer, &income.layer, &config)?;
    if stores.skipped > 0 {
        output.warnings.push(EnrichWarning::SkippedStores {
            count: stores.skipped,
        });
    }
    if income.skipped > 0 {
        output.warnings.push(EnrichWarning::SkippedIncomeAreas {
            count: income.skipped,
        });
    }

    for warning in &output.warnings {
        log::warn!("{warning}");
    }
    for store in output.qualifying() {
        log::info!(
            "  {} qualifies: {:.0} average over {} areas",
            store.id,
            store.aggregate.value().unwrap_or_default(),
            store.tract_count
        );
    }
    log::info!(
        "{} of {} stores meet the {:.0} threshold (field: {})",
        output.qualifying_buffers.len(),
        output.enriched.len(),
        output.threshold,
        output.income_field.as_deref().unwrap_or("none")
    );

    std::fs::create_dir_all(&args.output_dir)?;
    write_collection(
        &args.output_dir.join("store_points.geojson"),
        &layer::store_points_collection(&output),
    )?;
    write_collection(
        &args.output_dir.join("qualifying_buffers.geojson"),
        &layer::qualifying_buffers_collection(&output),
    )?;
    write_collection(
        &args.output_dir.join("income_areas.geojson"),
        &layer::income_areas_collection(&income.layer, config.default_crs())?,
    )?;

    log::info!("Wrote map layers to {}", args.output_dir.display());
    Ok(())
}

/// Reads the configuration file (or defaults) and applies flag overrides.
fn load_config(args: &RunArgs) -> Result<EnrichConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => parse_config(&std::fs::read_to_string(path)?)?,
        None => EnrichConfig::default(),
    };

    if let Some(radius) = args.radius_miles {
        config.buffer_radius_miles = radius;
    }
    if let Some(threshold) = args.threshold {
        config.income_threshold = threshold;
    }
    if let Some(working) = &args.working_crs {
        config.working_crs.clone_from(working);
    }
    if let Some(default) = &args.default_crs {
        config.default_crs = Some(default.clone());
    }

    Ok(config)
}

fn load_stores(
    path: &Path,
    config: &EnrichConfig,
) -> Result<LoadedLayer<Store>, Box<dyn std::error::Error>> {
    let fc = layer::parse_feature_collection(&std::fs::read_to_string(path)?)?;
    Ok(layer::stores_from_features(
        &layer_name(path),
        &fc,
        &config.store_id_field,
    ))
}

fn load_income_file(path: &Path) -> Result<LoadedLayer<IncomeArea>, Box<dyn std::error::Error>> {
    let fc = layer::parse_feature_collection(&std::fs::read_to_string(path)?)?;
    Ok(layer::income_from_features(&layer_name(path), &fc))
}

async fn fetch_income(
    source_id: &str,
) -> Result<LoadedLayer<IncomeArea>, Box<dyn std::error::Error>> {
    let source = registry::find_source(source_id)
        .ok_or_else(|| format!("Unknown income source '{source_id}'"))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("store_income/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let download = store_income_source::fetch_income(&client, &source).await?;
    let crs = download.crs.clone();

    let text = serde_json::to_string(&download.into_feature_collection())?;
    let fc = layer::parse_feature_collection(&text)?;
    let mut loaded = layer::income_from_features(&source.id, &fc);
    loaded.layer.crs.get_or_insert(crs);
    Ok(loaded)
}

fn write_collection(path: &Path, fc: &FeatureCollection) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, serde_json::to_string_pretty(fc)?)?;
    log::info!("  {} ({} features)", path.display(), fc.features.len());
    Ok(())
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
}
