//! Cuenca CLI - watershed delineation from D8 flow grids

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cuenca_core::io::open_raster;
use cuenca_delineation::{
    delineate_files, global_max, pixel_area_km2, DelineationParams, SnapParams, SnapPolicy,
    TileStoreParams,
};

#[derive(Parser)]
#[command(name = "cuenca")]
#[command(author, version, about = "Watershed delineation over D8 flow grids", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Delineate the watershed draining to an outlet point
    Delineate {
        /// D8 flow-direction raster (Esri encoding)
        #[arg(long)]
        flow_dir: PathBuf,
        /// Flow-accumulation raster (upstream cell counts)
        #[arg(long)]
        flow_accum: PathBuf,
        /// Outlet latitude (EPSG:4326)
        #[arg(long)]
        lat: f64,
        /// Outlet longitude (EPSG:4326)
        #[arg(long)]
        lon: f64,
        /// Minimum drainage area for the snapped outlet, km²
        #[arg(short, long, default_value = "1.0")]
        threshold: f64,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Keep the requested outlet when no network cell meets the threshold
        #[arg(long)]
        accept_unsnapped: bool,
        /// Flow-direction tiles kept resident during the traversal
        #[arg(long, default_value = "64")]
        max_tiles: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Info { input } => {
            let raster = open_raster(&input)
                .with_context(|| format!("cannot open {}", input.display()))?;
            let t = raster.transform();
            let bounds = raster.bounds();

            println!("File: {}", input.display());
            println!(
                "Dimensions: {} x {} ({} cells)",
                raster.width(),
                raster.height(),
                raster.width() * raster.height()
            );
            println!("Cell size: {} x {}", t.pixel_width, t.pixel_height.abs());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            if let Some((bh, bw)) = raster.block_size() {
                println!("Block size: {} x {}", bw, bh);
            }
            println!("Cell area: {:.6} km2", pixel_area_km2(raster.as_ref()));

            let pb = spinner("Scanning for maximum value...");
            let max = global_max(raster.as_ref())?;
            pb.finish_and_clear();
            println!("Max value: {}", max);
        }

        Commands::Delineate {
            flow_dir,
            flow_accum,
            lat,
            lon,
            threshold,
            out,
            accept_unsnapped,
            max_tiles,
        } => {
            let params = DelineationParams {
                snap: SnapParams {
                    threshold_km2: threshold,
                    ..SnapParams::default()
                },
                snap_policy: if accept_unsnapped {
                    SnapPolicy::AcceptOriginal
                } else {
                    SnapPolicy::Strict
                },
                tiles: TileStoreParams {
                    max_tiles,
                    ..TileStoreParams::default()
                },
                ..DelineationParams::default()
            };

            let pb = spinner("Delineating watershed...");
            let start = Instant::now();
            let summary = delineate_files(&flow_dir, &flow_accum, lat, lon, &params, &out)
                .context("delineation failed")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            println!("Watershed delineated");
            println!(
                "  Snapped outlet: ({:.6}, {:.6}) at cell ({}, {})",
                summary.snap.y, summary.snap.x, summary.snap.row, summary.snap.col
            );
            println!("  Accumulated area at outlet: {:.4} km2", summary.snap.accum_km2);
            println!("  Max accumulation in grid: {}", summary.accum_max);
            println!(
                "  Basin: {} cells, {:.4} km2",
                summary.area_cells, summary.area_km2
            );
            println!("  Vector: {}", summary.artifacts.vector_path.display());
            println!("  Raster: {}", summary.artifacts.raster_path.display());
            println!("  Processing time: {:.2?}", elapsed);
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
