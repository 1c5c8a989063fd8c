//! Command-line front end for range-filtered extraction over the Saltf volume.
//!
//! ```bash
//! saltf extract --min 2.2 --max 2.6 --format vtp
//! saltf request body.json --out pointcloud.ply
//! saltf octree-stats octree.bin --points
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "saltf")]
#[command(
    about = "Range-filtered point and volume extraction for the Saltf volume",
    long_about = None
)]
struct Cli {
    /// Settings file (JSON); missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Volume file, overriding the settings
    #[arg(long, global = true)]
    volume: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a value window and write the encoded body
    Extract {
        #[arg(long, allow_negative_numbers = true)]
        min: f64,
        #[arg(long, allow_negative_numbers = true)]
        max: f64,
        /// Format tag or alias (ply, ply-color, vtp, vti, octree, point-octree)
        #[arg(long, default_value = "ply")]
        format: String,
        #[arg(long)]
        colormap: Option<String>,
        #[arg(long)]
        brightness: Option<f32>,
        /// Force gzip on or off instead of the format default
        #[arg(long)]
        compress: Option<bool>,
        /// Output path; defaults to the format's download name
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run a JSON request body through the request boundary
    Request {
        /// Body file, or `-` for stdin
        body: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Persist a frontend log submission
    SaveLog {
        /// Submission file, or `-` for stdin
        body: PathBuf,
    },

    /// Value range and histogram of the loaded volume
    Stats {
        #[arg(long, default_value_t = 16)]
        bins: usize,
    },

    /// Decode an octree container and print per-level statistics
    OctreeStats {
        file: PathBuf,
        /// Decode point leaves and list them
        #[arg(long)]
        points: bool,
    },

    /// Summarize an encoded PLY or VTK XML body
    Inspect { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = commands::load_settings(cli.config.as_deref(), cli.volume)?;

    let level = logging::parse_level(&cli.log_level)
        .ok_or_else(|| anyhow!("unknown log level '{}'", cli.log_level))?;
    logging::setup_tracing(level, Some(settings.log_dir()))?;
    tracing::debug!("saltf starting");

    match cli.command {
        Command::Extract {
            min,
            max,
            format,
            colormap,
            brightness,
            compress,
            out,
        } => {
            let mut params = saltf_core::RequestParams::new(min, max, format.parse()?);
            params.colormap = colormap;
            params.brightness = brightness;
            params.compress = compress;
            commands::extract(&settings, &params, out)
        }
        Command::Request { body, out } => commands::request(&settings, &body, out),
        Command::SaveLog { body } => commands::save_log(&settings, &body),
        Command::Stats { bins } => commands::stats(&settings, bins),
        Command::OctreeStats { file, points } => commands::octree_stats(&file, points),
        Command::Inspect { file } => commands::inspect(&file),
    }
}
