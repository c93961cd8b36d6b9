//! Command-line interface for the BEV pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::core::dataset::Split;
use crate::core::loaders::load_velodyne_bin;
use crate::core::writers::write_velodyne_bin;
use crate::processors::filtering::{filter_fov, filter_points};
use crate::processors::kitti::KittiDataset;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "bev-pipeline")]
#[command(about = "LiDAR BEV rasterization and heatmap target encoding", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode every sample of a split
    Encode {
        /// Dataset split (train, val or test)
        #[arg(short, long, default_value = "train")]
        split: Split,
        /// Limit number of samples to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Encode one sample and print what was produced
    Inspect {
        /// Sample id (e.g. 42 for 000042.bin)
        sample_id: u32,
        /// Dataset split the sample belongs to
        #[arg(short, long, default_value = "val")]
        split: Split,
        /// Mirror the sample horizontally
        #[arg(long)]
        hflip: bool,
    },

    /// Crop a raw sweep to the field of view and region of interest
    Crop {
        /// Input velodyne .bin file
        input: PathBuf,
        /// Output velodyne .bin file
        output: PathBuf,
    },

    /// Write the default configuration as YAML
    DefaultConfig {
        /// Output YAML file
        output: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar over a known number of samples
fn create_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // Dispatch to subcommands
    match cli.command {
        Commands::Encode { split, limit } => {
            cmd_encode(split, limit, &config);
        }
        Commands::Inspect { sample_id, split, hflip } => {
            cmd_inspect(sample_id, split, hflip, &config);
        }
        Commands::Crop { input, output } => {
            cmd_crop(&input, &output, &config);
        }
        Commands::DefaultConfig { output } => {
            cmd_default_config(&output);
        }
    }
}

/// Per-sample outcome of a split run.
#[derive(Default)]
struct EncodeStats {
    encoded: AtomicUsize,
    failed: AtomicUsize,
    objects: AtomicUsize,
    flipped: AtomicUsize,
}

fn encode_one(dataset: &KittiDataset, index: usize, stats: &EncodeStats) -> Result<()> {
    let sample_id = dataset.ids().get(index).copied().unwrap_or_default();
    if dataset.split().has_labels() {
        let sample = dataset
            .load_sample(index)
            .with_context(|| format!("sample {:06}", sample_id))?;
        stats.objects.fetch_add(sample.targets.num_objects(), Ordering::Relaxed);
        if sample.provenance.hflipped {
            stats.flipped.fetch_add(1, Ordering::Relaxed);
        }
    } else {
        dataset
            .load_bev_only(index)
            .with_context(|| format!("sample {:06}", sample_id))?;
    }
    Ok(())
}

fn cmd_encode(split: Split, limit: Option<usize>, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Encoding {} split...", split);
    println!("Dataset root: {}", config.dataset.root.display());

    let dataset = match KittiDataset::open(config, split) {
        Ok(ds) => ds,
        Err(e) => {
            error!("Failed to open dataset: {}", e);
            std::process::exit(1);
        }
    };

    let total = limit.map_or(dataset.len(), |lim| lim.min(dataset.len()));
    if let Some(lim) = limit {
        println!("Processing limit: {} samples", lim);
    }

    let pb = create_progress_bar(total);
    let stats = EncodeStats::default();

    (0..total).into_par_iter().for_each(|index| {
        match encode_one(&dataset, index, &stats) {
            Ok(()) => {
                stats.encoded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Skipping {:#}", e);
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        pb.inc(1);
    });

    pb.finish_and_clear();

    let mut items = vec![
        ("Split", split.to_string()),
        ("Samples", total.to_string()),
        ("Encoded", stats.encoded.load(Ordering::Relaxed).to_string()),
        ("Failed", stats.failed.load(Ordering::Relaxed).to_string()),
    ];
    if split.has_labels() {
        items.push(("Objects encoded", stats.objects.load(Ordering::Relaxed).to_string()));
        items.push(("Flipped", stats.flipped.load(Ordering::Relaxed).to_string()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Encoding Complete", &items);
}

fn cmd_inspect(sample_id: u32, split: Split, hflip: bool, config: &PipelineConfig) {
    let start = Instant::now();

    let spinner = create_spinner(&format!("Encoding sample {:06}...", sample_id));

    let dataset = KittiDataset::from_ids(config, split, vec![sample_id]);
    let sample = match dataset.load_sample_id(sample_id, hflip) {
        Ok(s) => s,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Failed to encode sample {:06}: {}", sample_id, e);
            std::process::exit(1);
        }
    };

    spinner.finish_and_clear();

    let [rows, cols, channels] = sample.bev.shape();
    let targets = &sample.targets;
    let mut items = vec![
        ("LiDAR file", sample.provenance.lidar_path.display().to_string()),
        ("BEV shape", format!("{} x {} x {}", rows, cols, channels)),
        ("Points in ROI", sample.num_points.to_string()),
        ("Occupied cells", sample.bev.occupied_cells().to_string()),
        ("Heatmap shape", format!("{} x {} x {}", targets.num_classes(), targets.rows(), targets.cols())),
        ("Labels in ROI", sample.labels.len().to_string()),
        ("Valid slots", format!("{} / {}", targets.num_objects(), targets.max_objects())),
        ("Flipped", sample.provenance.hflipped.to_string()),
    ];

    let peaks: Vec<String> = (0..targets.num_classes())
        .map(|class| match targets.peak(class) {
            Some((r, c, v)) => format!("{}: {:.3} @ ({}, {})", class, v, r, c),
            None => format!("{}: -", class),
        })
        .collect();
    for peak in &peaks {
        items.push(("Class peak", peak.clone()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary(&format!("Sample {:06}", sample_id), &items);
}

fn crop_file(input: &Path, output: &Path, config: &PipelineConfig) -> Result<(usize, usize)> {
    let cloud = load_velodyne_bin(input)
        .with_context(|| format!("loading {}", input.display()))?;
    let visible = filter_fov(&cloud, &config.fov);
    let cropped = filter_points(&visible, &config.boundary);
    write_velodyne_bin(output, &cropped)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok((cloud.len(), cropped.len()))
}

fn cmd_crop(input: &Path, output: &Path, config: &PipelineConfig) {
    let start = Instant::now();

    println!("Cropping sweep...");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());

    match crop_file(input, output, config) {
        Ok((before, after)) => {
            print_summary(
                "Crop Complete",
                &[
                    ("Input file", input.display().to_string()),
                    ("Output file", output.display().to_string()),
                    ("Points in", before.to_string()),
                    ("Points kept", after.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Crop failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_default_config(output: &Path) {
    match PipelineConfig::default().to_yaml(output) {
        Ok(()) => println!("Wrote default configuration to {}", output.display()),
        Err(e) => {
            error!("Failed to write config: {}", e);
            std::process::exit(1);
        }
    }
}
