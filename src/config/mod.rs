//! Configuration types for the BEV pipeline.
//!
//! Every component receives its settings from an explicit, immutable
//! [`PipelineConfig`]; there are no global lookup tables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::loaders::Category;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid boundary: {0}")]
    InvalidBoundary(String),

    #[error("Invalid heatmap settings: {0}")]
    InvalidHeatmap(String),

    #[error("Class '{name}' maps to id {id}, which is outside 0..{num_classes}")]
    ClassOutOfRange {
        name: String,
        id: i32,
        num_classes: usize,
    },

    #[error("Invalid dataset settings: {0}")]
    InvalidDataset(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Number of grid cells needed to cover `extent` at `step` per cell.
///
/// Ratios within 1e-6 of an integer are snapped to it so that floating noise
/// (e.g. `50.0 / (50.0 / 608.0)`) never adds a spurious row.
pub fn grid_dim(extent: f64, step: f64) -> usize {
    if extent <= 0.0 || step <= 0.0 {
        return 0;
    }
    let ratio = extent / step;
    let nearest = ratio.round();
    if (ratio - nearest).abs() < 1e-6 {
        nearest as usize
    } else {
        ratio.ceil() as usize
    }
}

/// 3D region of interest in the LiDAR frame plus the BEV cell size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    #[serde(default = "default_min_x")]
    pub min_x: f64,

    #[serde(default = "default_max_x")]
    pub max_x: f64,

    #[serde(default = "default_min_y")]
    pub min_y: f64,

    #[serde(default = "default_max_y")]
    pub max_y: f64,

    #[serde(default = "default_min_z")]
    pub min_z: f64,

    #[serde(default = "default_max_z")]
    pub max_z: f64,

    /// Physical length covered by one BEV cell (meters)
    #[serde(default = "default_discretization")]
    pub discretization: f64,
}

fn default_min_x() -> f64 {
    0.0
}

fn default_max_x() -> f64 {
    50.0
}

fn default_min_y() -> f64 {
    -25.0
}

fn default_max_y() -> f64 {
    25.0
}

fn default_min_z() -> f64 {
    -2.73
}

fn default_max_z() -> f64 {
    1.27
}

fn default_discretization() -> f64 {
    50.0 / 608.0
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            min_x: default_min_x(),
            max_x: default_max_x(),
            min_y: default_min_y(),
            max_y: default_max_y(),
            min_z: default_min_z(),
            max_z: default_max_z(),
            discretization: default_discretization(),
        }
    }
}

impl BoundaryConfig {
    #[inline]
    pub fn size_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn size_y(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[inline]
    pub fn size_z(&self) -> f64 {
        self.max_z - self.min_z
    }

    /// BEV rows (the X axis).
    pub fn grid_rows(&self) -> usize {
        grid_dim(self.size_x(), self.discretization)
    }

    /// BEV columns (the Y axis).
    pub fn grid_cols(&self) -> usize {
        grid_dim(self.size_y(), self.discretization)
    }

    /// Closed-interval test used when cropping points.
    #[inline]
    pub fn contains_point(&self, x: f64, y: f64, z: f64) -> bool {
        x >= self.min_x
            && x <= self.max_x
            && y >= self.min_y
            && y <= self.max_y
            && z >= self.min_z
            && z <= self.max_z
    }

    /// Half-open test used for object centers, so that a center always maps
    /// to a cell strictly inside the grid.
    #[inline]
    pub fn contains_center(&self, x: f64, y: f64, z: f64) -> bool {
        x >= self.min_x
            && x < self.max_x
            && y >= self.min_y
            && y < self.max_y
            && z >= self.min_z
            && z < self.max_z
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.size_x() > 0.0 && self.size_y() > 0.0 && self.size_z() > 0.0) {
            return Err(ConfigError::InvalidBoundary(format!(
                "every axis needs max > min (x: {}..{}, y: {}..{}, z: {}..{})",
                self.min_x, self.max_x, self.min_y, self.max_y, self.min_z, self.max_z
            )));
        }
        if !(self.discretization > 0.0) {
            return Err(ConfigError::InvalidBoundary(format!(
                "discretization must be positive, got {}",
                self.discretization
            )));
        }
        Ok(())
    }
}

/// Settings for heatmap target encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapConfig {
    /// Heatmap grid size as [rows, cols]
    #[serde(default = "default_heatmap_size")]
    pub size: [usize; 2],

    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Capacity of the regression target arrays
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    /// Minimum IoU the Gaussian radius must preserve
    #[serde(default = "default_min_overlap")]
    pub min_overlap: f64,

    /// Value written at the center of ignored regions
    #[serde(default = "default_ignore_value")]
    pub ignore_value: f32,
}

fn default_heatmap_size() -> [usize; 2] {
    [152, 152]
}

fn default_num_classes() -> usize {
    3
}

fn default_max_objects() -> usize {
    50
}

fn default_min_overlap() -> f64 {
    0.7
}

fn default_ignore_value() -> f32 {
    0.9999
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            size: default_heatmap_size(),
            num_classes: default_num_classes(),
            max_objects: default_max_objects(),
            min_overlap: default_min_overlap(),
            ignore_value: default_ignore_value(),
        }
    }
}

impl HeatmapConfig {
    #[inline]
    pub fn rows(&self) -> usize {
        self.size[0]
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.size[1]
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows() == 0 || self.cols() == 0 {
            return Err(ConfigError::InvalidHeatmap(format!(
                "size must be non-empty, got {:?}",
                self.size
            )));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::InvalidHeatmap(
                "num_classes must be at least 1".to_string(),
            ));
        }
        if !(self.min_overlap > 0.0 && self.min_overlap < 1.0) {
            return Err(ConfigError::InvalidHeatmap(format!(
                "min_overlap must lie in (0, 1), got {}",
                self.min_overlap
            )));
        }
        if !(0.0..=1.0).contains(&self.ignore_value) {
            return Err(ConfigError::InvalidHeatmap(format!(
                "ignore_value must lie in [0, 1], got {}",
                self.ignore_value
            )));
        }
        Ok(())
    }
}

/// Horizontal field of view of the reference camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FovConfig {
    /// Full horizontal opening angle in degrees, centered on +X
    #[serde(default = "default_horizontal_deg")]
    pub horizontal_deg: f64,
}

fn default_horizontal_deg() -> f64 {
    90.0
}

impl Default for FovConfig {
    fn default() -> Self {
        Self {
            horizontal_deg: default_horizontal_deg(),
        }
    }
}

/// Class name to signed category id table.
///
/// Ids >= 0 are detector classes, -1 ignores every class at the object's
/// location, -2..=-98 ignore exactly class `-id - 2`, and ids <= -99 drop the
/// object at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    #[serde(default = "default_name_to_id")]
    pub name_to_id: BTreeMap<String, i32>,
}

fn default_name_to_id() -> BTreeMap<String, i32> {
    let mut table = BTreeMap::new();
    table.insert("Pedestrian".to_string(), 0);
    table.insert("Car".to_string(), 1);
    table.insert("Cyclist".to_string(), 2);
    table.insert("Van".to_string(), 1);
    table.insert("Truck".to_string(), -3);
    table.insert("Person_sitting".to_string(), 0);
    table.insert("Tram".to_string(), -99);
    table.insert("Misc".to_string(), -99);
    table.insert("DontCare".to_string(), -1);
    table
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            name_to_id: default_name_to_id(),
        }
    }
}

impl ClassConfig {
    /// Signed id for a class name, if the name is known.
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.name_to_id.get(name).copied()
    }

    pub fn validate(&self, num_classes: usize) -> Result<()> {
        for (name, &id) in &self.name_to_id {
            let in_range = match Category::from_id(id) {
                Some(Category::Real(class)) | Some(Category::IgnoreClass(class)) => {
                    class < num_classes
                }
                Some(Category::IgnoreAll) | None => true,
            };
            if !in_range {
                return Err(ConfigError::ClassOutOfRange {
                    name: name.clone(),
                    id,
                    num_classes,
                });
            }
        }
        Ok(())
    }
}

/// KITTI directory layout and sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset root containing `ImageSets/` and the sub folder
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_sub_folder")]
    pub sub_folder: String,

    #[serde(default = "default_lidar_dir")]
    pub lidar_dir: String,

    #[serde(default = "default_calib_dir")]
    pub calib_dir: String,

    #[serde(default = "default_label_dir")]
    pub label_dir: String,

    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    #[serde(default = "default_split_dir")]
    pub split_dir: String,

    /// Probability of a horizontal flip for train samples
    #[serde(default = "default_hflip_prob")]
    pub hflip_prob: f64,

    /// Keep only the first N ids of a split
    #[serde(default)]
    pub num_samples: Option<usize>,

    /// Base seed for the per-sample flip decision
    #[serde(default)]
    pub seed: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from("dataset/kitti")
}

fn default_sub_folder() -> String {
    "training".to_string()
}

fn default_lidar_dir() -> String {
    "velodyne".to_string()
}

fn default_calib_dir() -> String {
    "calib".to_string()
}

fn default_label_dir() -> String {
    "label_2".to_string()
}

fn default_image_dir() -> String {
    "image_2".to_string()
}

fn default_split_dir() -> String {
    "ImageSets".to_string()
}

fn default_hflip_prob() -> f64 {
    0.5
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            sub_folder: default_sub_folder(),
            lidar_dir: default_lidar_dir(),
            calib_dir: default_calib_dir(),
            label_dir: default_label_dir(),
            image_dir: default_image_dir(),
            split_dir: default_split_dir(),
            hflip_prob: default_hflip_prob(),
            num_samples: None,
            seed: 0,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.hflip_prob) {
            return Err(ConfigError::InvalidDataset(format!(
                "hflip_prob must lie in [0, 1], got {}",
                self.hflip_prob
            )));
        }
        Ok(())
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub boundary: BoundaryConfig,

    #[serde(default)]
    pub heatmap: HeatmapConfig,

    #[serde(default)]
    pub fov: FovConfig,

    #[serde(default)]
    pub classes: ClassConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field invariants before the config is handed to the core.
    pub fn validate(&self) -> Result<()> {
        self.boundary.validate()?;
        self.heatmap.validate()?;
        self.classes.validate(self.heatmap.num_classes)?;
        self.dataset.validate()?;
        Ok(())
    }
}
