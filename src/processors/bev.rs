//! Bird's-eye-view rasterization of a LiDAR sweep.
//!
//! Points are binned into a 2D grid over the region of interest (X → rows,
//! Y → columns). Each cell carries three channels in [0, 1]:
//!
//! - height: highest normalized z in the cell
//! - density: `min(1, ln(count + 1) / ln 64)`
//! - intensity: reflectance of the point that set the height

use log::debug;

use crate::config::BoundaryConfig;
use crate::core::loaders::PointCloud;

/// Number of points at which the density channel saturates.
const DENSITY_SATURATION: f64 = 64.0;

/// Channel of a BEV grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BevChannel {
    Height = 0,
    Density = 1,
    Intensity = 2,
}

impl BevChannel {
    pub const COUNT: usize = 3;
}

/// Dense `rows × cols × 3` grid, channels last.
#[derive(Debug, Clone, PartialEq)]
pub struct BevGrid {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl BevGrid {
    /// All-zero grid.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols * BevChannel::COUNT],
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

    /// `[rows, cols, channels]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.rows, self.cols, BevChannel::COUNT]
    }

    /// Flat channels-last buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    fn offset(&self, row: usize, col: usize, channel: BevChannel) -> usize {
        (row * self.cols + col) * BevChannel::COUNT + channel as usize
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize, channel: BevChannel) -> f32 {
        self.data[self.offset(row, col, channel)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, channel: BevChannel, value: f32) {
        let idx = self.offset(row, col, channel);
        self.data[idx] = value;
    }

    /// Mirror the grid left-to-right (column `c` swaps with `cols - 1 - c`).
    pub fn flip_columns(&mut self) {
        let width = self.cols * BevChannel::COUNT;
        for row in self.data.chunks_exact_mut(width.max(1)) {
            for col in 0..self.cols / 2 {
                let mirror = self.cols - 1 - col;
                for ch in 0..BevChannel::COUNT {
                    row.swap(col * BevChannel::COUNT + ch, mirror * BevChannel::COUNT + ch);
                }
            }
        }
    }

    /// Number of cells that received at least one point.
    pub fn occupied_cells(&self) -> usize {
        self.data
            .chunks_exact(BevChannel::COUNT)
            .filter(|cell| cell[BevChannel::Density as usize] > 0.0)
            .count()
    }
}

/// Cell index along one axis, clamped into the grid.
#[inline]
fn cell_index(coord: f64, min: f64, step: f64, dim: usize) -> usize {
    let idx = ((coord - min) / step).floor();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(dim - 1)
    }
}

/// Rasterize a cropped point cloud into a BEV grid.
///
/// The cloud is expected to be inside `roi` already; stray coordinates are
/// clamped to the border cells. Within a cell the first point to reach the
/// maximum height supplies the intensity; later points only replace it with a
/// strictly greater height.
///
/// # Arguments
///
/// * `cloud` - Points in the sensor frame
/// * `roi` - Region of interest and discretization
///
/// # Returns
///
/// A grid of `roi.grid_rows() × roi.grid_cols() × 3` values in [0, 1].
pub fn make_bev_map(cloud: &PointCloud, roi: &BoundaryConfig) -> BevGrid {
    let rows = roi.grid_rows();
    let cols = roi.grid_cols();
    let mut grid = BevGrid::zeros(rows, cols);
    if cloud.is_empty() || rows == 0 || cols == 0 {
        return grid;
    }

    let cells = rows * cols;
    let mut counts = vec![0u32; cells];
    let mut heights = vec![0.0f64; cells];
    let mut intensity = vec![0.0f32; cells];

    let size_z = roi.size_z();
    for i in 0..cloud.len() {
        let [x, y, z, r] = cloud.point(i);
        let row = cell_index(x as f64, roi.min_x, roi.discretization, rows);
        let col = cell_index(y as f64, roi.min_y, roi.discretization, cols);
        let cell = row * cols + col;

        let height = ((z as f64 - roi.min_z) / size_z).clamp(0.0, 1.0);
        if counts[cell] == 0 || height > heights[cell] {
            heights[cell] = height;
            intensity[cell] = r.clamp(0.0, 1.0);
        }
        counts[cell] += 1;
    }

    let norm = DENSITY_SATURATION.ln();
    let mut occupied = 0usize;
    for cell in 0..cells {
        if counts[cell] == 0 {
            continue;
        }
        occupied += 1;
        let (row, col) = (cell / cols, cell % cols);
        let density = ((counts[cell] as f64 + 1.0).ln() / norm).min(1.0);
        grid.set(row, col, BevChannel::Height, heights[cell] as f32);
        grid.set(row, col, BevChannel::Density, density as f32);
        grid.set(row, col, BevChannel::Intensity, intensity[cell]);
    }

    debug!(
        "rasterized {} points into {} of {} cells",
        cloud.len(),
        occupied,
        cells
    );
    grid
}
