//! Data processing modules.

pub mod bev;
pub mod filtering;
pub mod heatmap;
pub mod kitti;
pub mod radius;
pub mod sample;

// Re-export key types for convenience
pub use bev::{make_bev_map, BevChannel, BevGrid};
pub use filtering::{filter_fov, filter_labels, filter_lidar, filter_points};
pub use heatmap::{build_targets, draw_gaussian, gaussian_weight, HeatmapTargets};
pub use kitti::KittiDataset;
pub use radius::{box_radius, compute_radius};
pub use sample::{
    Augmentation, BevSample, EncodedSample, SampleEncoder, SampleError, SampleProvenance,
};
