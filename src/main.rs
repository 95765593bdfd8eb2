//! Plot a directory of GPX files onto one web map.
//!
//! ```text
//! track-overlay ~/activities --activity running --activity walking \
//!     --since 2023-01-01 --filter-outliers
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use log::{info, warn};

use track_overlay::pipeline::run_and_render;
use track_overlay::time::parse_timestamp;
use track_overlay::{
    load_directory, GeoJsonFile, LeafletMap, OutlierConfig, OutlierMethod, PipelineConfig,
    SelectionCriteria,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Standalone Leaflet page over OpenStreetMap
    Html,
    /// Plain GeoJSON FeatureCollection
    Geojson,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    /// Distance from the median track centre
    Centroid,
    /// DBSCAN clusters of track centres
    Density,
}

impl From<MethodArg> for OutlierMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Centroid => OutlierMethod::CentroidDistance,
            MethodArg::Density => OutlierMethod::DensityClusters,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "track-overlay", version, about = "Overlay GPX tracks on a web map")]
struct Cli {
    /// Directory containing .gpx files
    #[arg(value_hint = ValueHint::DirPath)]
    directory: PathBuf,

    /// Only plot these activity types (repeatable; default: all)
    #[arg(long, num_args = 1.., action = ArgAction::Append)]
    activity: Vec<String>,

    /// Only plot activities starting on or after this date (ISO-8601)
    #[arg(long)]
    since: Option<String>,

    /// Drop tracks far away from the rest when they are under 10% of the total
    #[arg(long, alias = "filter_outliers")]
    filter_outliers: bool,

    /// How far-away tracks are identified
    #[arg(long, value_enum, default_value_t = MethodArg::Centroid)]
    outlier_method: MethodArg,

    /// Output file
    #[arg(short, long, default_value = "map-all.html", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Reject a bad date before touching the file system
    let since = cli
        .since
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .context("invalid --since date")?;

    let config = PipelineConfig {
        criteria: SelectionCriteria::new(since, cli.activity),
        filter_outliers: cli.filter_outliers,
        outliers: OutlierConfig {
            method: cli.outlier_method.into(),
            ..OutlierConfig::default()
        },
    };

    let report = load_directory(&cli.directory)
        .with_context(|| format!("cannot read {}", cli.directory.display()))?;

    if !report.failures.is_empty() {
        warn!(
            "{} of {} files could not be read and were skipped",
            report.failures.len(),
            report.files_read
        );
    }

    let written = match cli.format {
        OutputFormat::Html => {
            let mut map = LeafletMap::new(&cli.output);
            run_and_render(report.tracks, &config, &mut map)?
        }
        OutputFormat::Geojson => {
            let mut file = GeoJsonFile::new(&cli.output);
            run_and_render(report.tracks, &config, &mut file)?
        }
    };

    info!("Open {} in a browser to view the map", written.display());
    println!("{}", written.display());

    Ok(())
}
