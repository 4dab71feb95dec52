//! Exposes the command line application.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use photogrid_service::config::Config;
use photogrid_service::download::{ImageDownloader, RoverClient};
use photogrid_service::pipeline::{ImagePipeline, SlotId};
use photogrid_service::{logging, metrics};
use photogrid_sources::Sol;

use crate::output::DirectoryRender;

/// Photogrid commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Download the photos a rover took on one sol.
    Fetch(FetchArgs),

    /// Print the mission manifest of a rover.
    Manifest(ManifestArgs),
}

#[derive(Debug, Args)]
struct FetchArgs {
    /// The rover whose photos to fetch, e.g. `curiosity`.
    rover: String,

    /// The sol to fetch photos for.
    ///
    /// Defaults to the most recent sol with photos.
    #[arg(long)]
    sol: Option<Sol>,

    /// The directory to write images into.
    #[arg(long, short, default_value = "photos")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct ManifestArgs {
    /// The rover whose manifest to print, e.g. `curiosity`.
    rover: String,

    /// How many of the most recent sols to list.
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

/// Command line interface parser.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config.as_deref()).context("failed loading config")?;

    // SAFETY: We are in a single-threaded context before the runtime starts.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async {
        match cli.command {
            Command::Fetch(args) => fetch(config, args).await,
            Command::Manifest(args) => manifest(config, args).await,
        }
    })
}

async fn fetch(config: Config, args: FetchArgs) -> Result<()> {
    let client = RoverClient::new(config.api.clone(), config.timeouts, &config.in_memory);

    let rover = client
        .rover(&args.rover)
        .await
        .context("failed to fetch the rover manifest")?;
    let sol = args.sol.unwrap_or(rover.max_sol);

    let photos = client
        .list_photos(&args.rover, sol)
        .await
        .context("failed to list photos")?;
    if photos.is_empty() {
        tracing::info!("{} took no photos on sol {sol}", rover.name);
        return Ok(());
    }

    std::fs::create_dir_all(&args.output).context("failed to create the output directory")?;

    let render = Arc::new(DirectoryRender::new(
        args.output.clone(),
        photos.iter().map(|photo| photo.id).collect(),
    ));
    let downloader = ImageDownloader::new(config.timeouts);
    let pipeline = ImagePipeline::new(&config, downloader, render.clone());

    tracing::info!(
        "Fetching {} photos taken by {} on sol {sol}",
        photos.len(),
        rover.name
    );

    for (index, photo) in photos.iter().enumerate() {
        pipeline.request(SlotId(index as u32), photo);
    }

    while pipeline.in_flight_fetches() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    // deliveries trail the fetches; give the last ones a moment to land
    tokio::time::sleep(Duration::from_millis(200)).await;

    let written = render.written();
    if written < photos.len() {
        tracing::warn!(
            "Saved {written} of {} photos to {}",
            photos.len(),
            args.output.display()
        );
    } else {
        tracing::info!("Saved {written} photos to {}", args.output.display());
    }

    Ok(())
}

async fn manifest(config: Config, args: ManifestArgs) -> Result<()> {
    let client = RoverClient::new(config.api.clone(), config.timeouts, &config.in_memory);

    let rover = client
        .rover(&args.rover)
        .await
        .context("failed to fetch the rover manifest")?;

    println!(
        "{} ({}): {} photos up to sol {}",
        rover.name, rover.status, rover.total_photos, rover.max_sol
    );

    for description in rover.sol_descriptions.iter().rev().take(args.limit) {
        println!(
            "  sol {:>5}  {}  {:>6} photos  [{}]",
            description.sol,
            description.earth_date,
            description.total_photos,
            description.cameras.join(", ")
        );
    }

    Ok(())
}
