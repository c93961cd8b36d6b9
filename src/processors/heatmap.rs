//! CenterNet-style training targets.
//!
//! Every object becomes a Gaussian peak in its class heatmap plus a
//! regression slot (sub-cell offset, heading, height above ground, size).
//! Objects tagged as "ignore" only suppress the heatmaps of the classes they
//! cover and never occupy a slot.

use log::{debug, trace, warn};

use crate::config::{BoundaryConfig, HeatmapConfig};
use crate::core::loaders::{Category, ObjectLabel3D};

use super::radius::box_radius;

/// Heatmaps and per-object regression targets for one sample.
///
/// Heatmaps are stored class-major (`[class][row][col]`). Regression arrays
/// hold `max_objects` slots; slot `k` belongs to the `k`-th input label and
/// stays zero with `mask == 0` when that label is not encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapTargets {
    rows: usize,
    cols: usize,
    num_classes: usize,
    pub heatmaps: Vec<f32>,
    /// Sub-cell center offset as `[col, row]`.
    pub offsets: Vec<[f32; 2]>,
    /// Heading as `[sin, cos]`.
    pub directions: Vec<[f32; 2]>,
    /// Box center height above the ROI floor.
    pub depths: Vec<f32>,
    /// Box size as `[h, w, l]`.
    pub dims: Vec<[f32; 3]>,
    /// Flattened center cell, `row * cols + col`.
    pub indices: Vec<i64>,
    pub mask: Vec<u8>,
}

impl HeatmapTargets {
    /// Empty targets for the configured grid.
    pub fn new(cfg: &HeatmapConfig) -> Self {
        let (rows, cols) = (cfg.rows(), cfg.cols());
        let slots = cfg.max_objects;
        Self {
            rows,
            cols,
            num_classes: cfg.num_classes,
            heatmaps: vec![0.0; cfg.num_classes * rows * cols],
            offsets: vec![[0.0; 2]; slots],
            directions: vec![[0.0; 2]; slots],
            depths: vec![0.0; slots],
            dims: vec![[0.0; 3]; slots],
            indices: vec![0; slots],
            mask: vec![0; slots],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    pub fn max_objects(&self) -> usize {
        self.mask.len()
    }

    /// Heatmap of one class, row-major.
    pub fn heatmap(&self, class: usize) -> &[f32] {
        let plane = self.rows * self.cols;
        &self.heatmaps[class * plane..(class + 1) * plane]
    }

    fn heatmap_mut(&mut self, class: usize) -> &mut [f32] {
        let plane = self.rows * self.cols;
        &mut self.heatmaps[class * plane..(class + 1) * plane]
    }

    #[inline]
    pub fn heat(&self, class: usize, row: usize, col: usize) -> f32 {
        self.heatmaps[(class * self.rows + row) * self.cols + col]
    }

    /// Number of slots with `mask == 1`.
    pub fn num_objects(&self) -> usize {
        self.mask.iter().filter(|&&m| m == 1).count()
    }

    /// Highest value of a class heatmap with its `(row, col)`.
    pub fn peak(&self, class: usize) -> Option<(usize, usize, f32)> {
        self.heatmap(class)
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.0)
            .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
            .map(|(i, v)| (i / self.cols, i % self.cols, v))
    }
}

/// Weight of the stamp at offset `(dy, dx)` from its center.
///
/// Uses `sigma = (2 * radius + 1) / 6`. The center is exactly 1.0 and values
/// below `f64::EPSILON` are set to zero.
pub fn gaussian_weight(radius: usize, dy: f64, dx: f64) -> f64 {
    let sigma = (2.0 * radius as f64 + 1.0) / 6.0;
    let g = (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
    if g < f64::EPSILON {
        0.0
    } else {
        g
    }
}

/// Max-merge a Gaussian stamp centered on `(row, col)` into a heatmap.
///
/// The stamp is clipped at the grid borders and only the cells inside the
/// grid are evaluated, so the cost is bounded by the grid size whatever the
/// radius.
pub fn draw_gaussian(
    heatmap: &mut [f32],
    rows: usize,
    cols: usize,
    center: (usize, usize),
    radius: usize,
) {
    let (row, col) = center;
    if row >= rows || col >= cols {
        return;
    }

    let top = row.min(radius);
    let bottom = (rows - row).min(radius.saturating_add(1));
    let left = col.min(radius);
    let right = (cols - col).min(radius.saturating_add(1));

    for hm_row in row - top..row + bottom {
        let dy = hm_row as f64 - row as f64;
        for hm_col in col - left..col + right {
            let dx = hm_col as f64 - col as f64;
            let g = gaussian_weight(radius, dy, dx) as f32;
            let cell = &mut heatmap[hm_row * cols + hm_col];
            if g > *cell {
                *cell = g;
            }
        }
    }
}

#[inline]
fn discrete(coord: f64, dim: usize) -> usize {
    let floored = coord.floor();
    if floored <= 0.0 {
        0
    } else {
        (floored as usize).min(dim - 1)
    }
}

/// Encode LiDAR-frame labels into heatmaps and regression slots.
///
/// Only the first `max_objects` labels are considered and label `k` always
/// owns slot `k`. Labels centered outside the ROI or with a non-positive
/// dimension are skipped. When `hflipped` is set the column axis is mirrored
/// to match a horizontally flipped BEV grid.
///
/// # Arguments
///
/// * `labels` - Objects in the LiDAR frame, in input order
/// * `hflipped` - Whether the paired BEV grid was mirrored
/// * `roi` - Region of interest the heatmap grid spans
/// * `cfg` - Heatmap grid size, class count and slot capacity
pub fn build_targets(
    labels: &[ObjectLabel3D],
    hflipped: bool,
    roi: &BoundaryConfig,
    cfg: &HeatmapConfig,
) -> HeatmapTargets {
    let mut targets = HeatmapTargets::new(cfg);
    let (rows, cols) = (targets.rows, targets.cols);
    if rows == 0 || cols == 0 {
        return targets;
    }

    if labels.len() > cfg.max_objects {
        debug!(
            "{} labels exceed capacity, encoding the first {}",
            labels.len(),
            cfg.max_objects
        );
    }

    for (k, label) in labels.iter().take(cfg.max_objects).enumerate() {
        let b = &label.bbox;
        if !roi.contains_center(b.x, b.y, b.z) || !b.has_positive_dims() {
            trace!("slot {}: skipping {:?} (outside ROI or degenerate size)", k, label.category);
            continue;
        }

        let radius = box_radius(b, roi, cfg);

        let row = (b.x - roi.min_x) / roi.size_x() * rows as f64;
        let mut col = (b.y - roi.min_y) / roi.size_y() * cols as f64;
        if hflipped {
            col = cols as f64 - 1.0 - col;
        }
        let row_int = discrete(row, rows);
        let col_int = discrete(col, cols);

        match label.category {
            Category::Real(class) if class >= cfg.num_classes => {
                warn!(
                    "slot {}: class id {} outside {} heatmap classes, skipping",
                    k, class, cfg.num_classes
                );
            }
            Category::Real(class) => {
                draw_gaussian(targets.heatmap_mut(class), rows, cols, (row_int, col_int), radius);

                let yaw = -b.yaw;
                let mut sin = yaw.sin();
                if hflipped {
                    sin = -sin;
                }

                targets.offsets[k] = [(col - col_int as f64) as f32, (row - row_int as f64) as f32];
                targets.directions[k] = [sin as f32, yaw.cos() as f32];
                targets.depths[k] = (b.z - roi.min_z) as f32;
                targets.dims[k] = [b.h as f32, b.w as f32, b.l as f32];
                targets.indices[k] = (row_int * cols + col_int) as i64;
                targets.mask[k] = 1;
            }
            ignore => {
                for class in ignore.ignored_classes(cfg.num_classes) {
                    let heatmap = targets.heatmap_mut(class);
                    draw_gaussian(heatmap, rows, cols, (row_int, col_int), radius);
                    heatmap[row_int * cols + col_int] = cfg.ignore_value;
                }
            }
        }
    }

    targets
}
