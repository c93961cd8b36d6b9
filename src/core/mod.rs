//! Core data types and I/O operations.

pub mod dataset;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use dataset::{DatasetError, KittiLayout, Split};
pub use loaders::{Box3d, Calibration, Category, LabelSet, LoaderError, ObjectLabel3D, PointCloud};
pub use writers::{write_velodyne_bin, WriteError};
