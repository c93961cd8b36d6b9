//! Data loaders for KITTI-style LiDAR sweeps, calibration and label files.
//!
//! This module provides parsers for:
//! - Raw velodyne sweeps (little-endian `f32` x, y, z, reflectance; no header)
//! - Calibration text files (`KEY: v0 v1 ...` per line)
//! - Object label text files (15 whitespace-separated fields per object)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::trace;
use nalgebra::{Matrix3, Matrix3x4};
use thiserror::Error;

use crate::config::ClassConfig;

/// Bytes per point in a raw velodyne sweep (4 × `f32`).
pub const BYTES_PER_POINT: usize = 16;

/// Number of whitespace-separated fields in a label row.
pub const LABEL_FIELDS: usize = 15;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl LoaderError {
    /// Prefix a parse failure with the file it came from.
    fn in_file(self, path: &Path) -> Self {
        match self {
            LoaderError::MalformedInput(msg) => {
                LoaderError::MalformedInput(format!("{}: {}", path.display(), msg))
            }
            other => other,
        }
    }
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Column-wise LiDAR point cloud in the sensor frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// X coordinates (forward).
    pub x: Vec<f32>,
    /// Y coordinates (left).
    pub y: Vec<f32>,
    /// Z coordinates (up).
    pub z: Vec<f32>,
    /// Reflectance values, nominally in [0, 1].
    pub reflectance: Vec<f32>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            reflectance: Vec::new(),
        }
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            reflectance: Vec::with_capacity(capacity),
        }
    }

    /// Builds a cloud from `[x, y, z, reflectance]` rows.
    pub fn from_points(points: &[[f32; 4]]) -> Self {
        let mut cloud = Self::with_capacity(points.len());
        for p in points {
            cloud.push(p[0], p[1], p[2], p[3]);
        }
        cloud
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32, reflectance: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.reflectance.push(reflectance);
    }

    /// Returns row `i` as `[x, y, z, reflectance]`.
    #[inline]
    pub fn point(&self, i: usize) -> [f32; 4] {
        [self.x[i], self.y[i], self.z[i], self.reflectance[i]]
    }

    /// Keeps the rows for which `keep` returns true, preserving order.
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut([f32; 4]) -> bool,
    {
        let mut out = Self::with_capacity(self.len());
        for i in 0..self.len() {
            let p = self.point(i);
            if keep(p) {
                out.push(p[0], p[1], p[2], p[3]);
            }
        }
        out
    }
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a raw velodyne sweep held in memory.
///
/// # Errors
///
/// Returns `MalformedInput` if the byte length is not a multiple of 16.
pub fn parse_velodyne_bytes(bytes: &[u8]) -> Result<PointCloud> {
    if bytes.len() % BYTES_PER_POINT != 0 {
        return Err(LoaderError::MalformedInput(format!(
            "sweep length {} is not a multiple of {} bytes",
            bytes.len(),
            BYTES_PER_POINT
        )));
    }

    let mut cloud = PointCloud::with_capacity(bytes.len() / BYTES_PER_POINT);
    for row in bytes.chunks_exact(BYTES_PER_POINT) {
        let read = |offset: usize| {
            f32::from_le_bytes([row[offset], row[offset + 1], row[offset + 2], row[offset + 3]])
        };
        cloud.push(read(0), read(4), read(8), read(12));
    }
    Ok(cloud)
}

/// Load a raw velodyne sweep (`.bin`) from disk.
///
/// # Arguments
///
/// * `path` - Path to the sweep file
///
/// # Returns
///
/// A `PointCloud` with `file length / 16` rows.
pub fn load_velodyne_bin<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_velodyne_bytes(&bytes).map_err(|e| e.in_file(path))
}

/// Per-sample calibration: LiDAR→camera rigid transform, rectification and
/// projection of the left color camera.
///
/// The inverses used for camera→LiDAR conversion are computed once on
/// construction, so a `Calibration` is always invertible.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    p2: Matrix3x4<f64>,
    r0: Matrix3<f64>,
    v2c: Matrix3x4<f64>,
    r0_inv: Matrix3<f64>,
    c2v: Matrix3x4<f64>,
}

impl Calibration {
    /// Bundle the three calibration matrices.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if `r0` is singular.
    pub fn new(p2: Matrix3x4<f64>, r0: Matrix3<f64>, v2c: Matrix3x4<f64>) -> Result<Self> {
        let r0_inv = r0.try_inverse().ok_or_else(|| {
            LoaderError::MalformedInput("rectification matrix R0 is singular".to_string())
        })?;
        let c2v = crate::core::transforms::inverse_rigid_transform(&v2c);
        Ok(Self {
            p2,
            r0,
            v2c,
            r0_inv,
            c2v,
        })
    }

    /// Parse the text calibration format.
    ///
    /// Requires `P2` (12 values), `R0_rect` or `R_rect` (9 values) and
    /// `Tr_velo_to_cam` or `Tr_velo_cam` (12 values). Other entries are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries: HashMap<&str, Vec<f64>> = HashMap::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, values) = line.split_once(':').ok_or_else(|| {
                LoaderError::MalformedInput(format!(
                    "line {}: expected 'KEY: values', got '{}'",
                    line_no + 1,
                    line
                ))
            })?;
            let key = key.trim();

            let values = values
                .split_whitespace()
                .map(|v| {
                    v.parse::<f64>().map_err(|_| {
                        LoaderError::MalformedInput(format!(
                            "line {}: invalid number '{}' in {}",
                            line_no + 1,
                            v,
                            key
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            entries.insert(key, values);
        }

        let p2 = calib_entry(&entries, &["P2"], 12)?;
        let r0 = calib_entry(&entries, &["R0_rect", "R_rect"], 9)?;
        let v2c = calib_entry(&entries, &["Tr_velo_to_cam", "Tr_velo_cam"], 12)?;

        Self::new(
            Matrix3x4::from_row_slice(p2),
            Matrix3::from_row_slice(r0),
            Matrix3x4::from_row_slice(v2c),
        )
    }

    /// Camera projection matrix (3×4).
    #[inline]
    pub fn p2(&self) -> &Matrix3x4<f64> {
        &self.p2
    }

    /// Rectification rotation (3×3).
    #[inline]
    pub fn r0(&self) -> &Matrix3<f64> {
        &self.r0
    }

    /// Rigid LiDAR→camera transform (3×4).
    #[inline]
    pub fn v2c(&self) -> &Matrix3x4<f64> {
        &self.v2c
    }

    #[inline]
    pub(crate) fn r0_inv(&self) -> &Matrix3<f64> {
        &self.r0_inv
    }

    /// Rigid camera→LiDAR transform (3×4).
    #[inline]
    pub fn c2v(&self) -> &Matrix3x4<f64> {
        &self.c2v
    }
}

fn calib_entry<'a>(
    entries: &'a HashMap<&str, Vec<f64>>,
    keys: &[&'a str],
    expected: usize,
) -> Result<&'a [f64]> {
    let values = keys
        .iter()
        .find_map(|key| entries.get(key))
        .ok_or_else(|| {
            LoaderError::MalformedInput(format!("missing calibration entry {}", keys.join("/")))
        })?;

    if values.len() != expected {
        return Err(LoaderError::MalformedInput(format!(
            "calibration entry {} has {} values, expected {}",
            keys[0],
            values.len(),
            expected
        )));
    }
    Ok(values)
}

/// Load a calibration text file.
pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<Calibration> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LoaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Calibration::parse(&text).map_err(|e| e.in_file(path))
}

/// What the encoder should do with an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A detector class that receives a heatmap peak and a regression slot.
    Real(usize),
    /// Suppress every class at the object's location.
    IgnoreAll,
    /// Suppress exactly one class at the object's location.
    IgnoreClass(usize),
}

impl Category {
    /// Ids at or below this value are excluded before encoding.
    pub const EXCLUDED_ID: i32 = -99;

    /// Decode a signed class-table id; `None` means "drop the object".
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            id if id >= 0 => Some(Category::Real(id as usize)),
            -1 => Some(Category::IgnoreAll),
            id if id > Self::EXCLUDED_ID => Some(Category::IgnoreClass((-id - 2) as usize)),
            _ => None,
        }
    }

    /// Classes whose heatmaps are suppressed by this category.
    pub fn ignored_classes(&self, num_classes: usize) -> Vec<usize> {
        match *self {
            Category::Real(_) => Vec::new(),
            Category::IgnoreAll => (0..num_classes).collect(),
            Category::IgnoreClass(class) if class < num_classes => vec![class],
            Category::IgnoreClass(_) => Vec::new(),
        }
    }
}

/// Oriented 3D box: center, dimensions (h, w, l) and yaw.
///
/// The frame (camera or LiDAR) is implied by where the box came from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Box3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub h: f64,
    pub w: f64,
    pub l: f64,
    pub yaw: f64,
}

impl Box3d {
    #[inline]
    pub fn has_positive_dims(&self) -> bool {
        self.h > 0.0 && self.w > 0.0 && self.l > 0.0
    }
}

/// One annotated object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectLabel3D {
    pub category: Category,
    pub bbox: Box3d,
}

impl ObjectLabel3D {
    /// All-zero row used when a sample has no usable labels.
    pub fn placeholder() -> Self {
        Self {
            category: Category::Real(0),
            bbox: Box3d::default(),
        }
    }
}

/// Image-plane annotation fields that travel with a label row.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnnotation {
    pub class_name: String,
    /// Truncation ratio in [0, 1]
    pub truncated: f32,
    /// 0 = visible, 1 = partly occluded, 2 = largely occluded, 3 = unknown
    pub occluded: i32,
    /// Observation angle in [-pi, pi]
    pub alpha: f64,
    /// [xmin, ymin, xmax, ymax] in pixels
    pub bbox_2d: [f64; 4],
}

/// Labels of one sample, in camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    /// Objects in file order; a single placeholder row when `has_labels` is false.
    pub labels: Vec<ObjectLabel3D>,
    /// Image-plane fields aligned with `labels` (empty when `has_labels` is false).
    pub annotations: Vec<ImageAnnotation>,
    pub has_labels: bool,
}

impl LabelSet {
    /// Set holding only the placeholder row.
    pub fn unlabeled() -> Self {
        Self {
            labels: vec![ObjectLabel3D::placeholder()],
            annotations: Vec::new(),
            has_labels: false,
        }
    }
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], idx: usize, line_no: usize) -> Result<T> {
    fields[idx].parse::<T>().map_err(|_| {
        LoaderError::MalformedInput(format!(
            "line {}: invalid value '{}' in field {}",
            line_no + 1,
            fields[idx],
            idx
        ))
    })
}

/// Parse label text.
///
/// Each non-blank line holds: class name, truncation, occlusion, alpha,
/// 4 bbox values, h, w, l, x, y, z, yaw (camera frame). Rows whose class id
/// is <= -99 are skipped.
///
/// # Errors
///
/// Returns `MalformedInput` for unknown class names, short rows, or
/// non-numeric fields.
pub fn parse_labels(text: &str, classes: &ClassConfig) -> Result<LabelSet> {
    let mut labels = Vec::new();
    let mut annotations = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < LABEL_FIELDS {
            return Err(LoaderError::MalformedInput(format!(
                "line {}: expected {} fields, found {}",
                line_no + 1,
                LABEL_FIELDS,
                fields.len()
            )));
        }

        let class_name = fields[0];
        let id = classes.id_of(class_name).ok_or_else(|| {
            LoaderError::MalformedInput(format!(
                "line {}: unknown class '{}'",
                line_no + 1,
                class_name
            ))
        })?;
        let Some(category) = Category::from_id(id) else {
            trace!("skipping excluded class {} on line {}", class_name, line_no + 1);
            continue;
        };

        let truncated: f32 = parse_field(&fields, 1, line_no)?;
        let occluded: i32 = parse_field(&fields, 2, line_no)?;
        let alpha: f64 = parse_field(&fields, 3, line_no)?;
        let mut bbox_2d = [0.0; 4];
        for (i, v) in bbox_2d.iter_mut().enumerate() {
            *v = parse_field(&fields, 4 + i, line_no)?;
        }

        let bbox = Box3d {
            h: parse_field(&fields, 8, line_no)?,
            w: parse_field(&fields, 9, line_no)?,
            l: parse_field(&fields, 10, line_no)?,
            x: parse_field(&fields, 11, line_no)?,
            y: parse_field(&fields, 12, line_no)?,
            z: parse_field(&fields, 13, line_no)?,
            yaw: parse_field(&fields, 14, line_no)?,
        };

        labels.push(ObjectLabel3D { category, bbox });
        annotations.push(ImageAnnotation {
            class_name: class_name.to_string(),
            truncated,
            occluded,
            alpha,
            bbox_2d,
        });
    }

    if labels.is_empty() {
        return Ok(LabelSet::unlabeled());
    }

    Ok(LabelSet {
        labels,
        annotations,
        has_labels: true,
    })
}

/// Load a label text file.
pub fn load_labels<P: AsRef<Path>>(path: P, classes: &ClassConfig) -> Result<LabelSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| LoaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_labels(&text, classes).map_err(|e| e.in_file(path))
}
