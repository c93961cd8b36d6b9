//! LiDAR bird's-eye-view rasterization and heatmap target encoding.
//!
//! This crate provides tools for:
//! - Loading KITTI-style velodyne sweeps, calibration and label files
//! - Converting boxes between the camera and LiDAR frames
//! - Cropping points and labels to a field of view and region of interest
//! - Rasterizing sweeps into height/density/intensity BEV grids
//! - Encoding objects as CenterNet heatmaps and regression targets
//!
//! # Example
//!
//! ```no_run
//! use bev_pipeline::core::loaders::load_velodyne_bin;
//! use bev_pipeline::processors::SampleEncoder;
//! use bev_pipeline::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! let cloud = load_velodyne_bin("000000.bin").unwrap();
//! let bev = SampleEncoder::new(&config).encode_bev_only(&cloud);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{BoundaryConfig, ClassConfig, DatasetConfig, FovConfig, HeatmapConfig, PipelineConfig};
pub use core::loaders::{Calibration, LabelSet, ObjectLabel3D, PointCloud};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
