//! Gaussian radius for CenterNet-style heatmap targets.
//!
//! The radius is the largest integer shift of a box corner that still keeps
//! the IoU of the shifted box with the ground truth above `min_overlap`,
//! taken over three shifting cases.

use crate::config::{BoundaryConfig, HeatmapConfig};
use crate::core::loaders::Box3d;

/// Largest root of `a r² - b r + c = 0` in the form used by CenterNet.
#[inline]
fn case_root(a: f64, b: f64, c: f64) -> f64 {
    let discriminant = (b * b - 4.0 * a * c).max(0.0);
    (b + discriminant.sqrt()) / 2.0
}

/// Gaussian radius for a box footprint of `(height, width)` heatmap cells.
///
/// Returns 0 for a zero footprint and is non-decreasing in both dimensions.
pub fn compute_radius(size: (f64, f64), min_overlap: f64) -> usize {
    let (height, width) = size;
    let o = min_overlap;

    let b1 = height + width;
    let c1 = width * height * (1.0 - o) / (1.0 + o);
    let r1 = case_root(1.0, b1, c1);

    let b2 = 2.0 * (height + width);
    let c2 = (1.0 - o) * width * height;
    let r2 = case_root(4.0, b2, c2);

    let a3 = 4.0 * o;
    let b3 = -2.0 * o * (height + width);
    let c3 = (o - 1.0) * width * height;
    let r3 = case_root(a3, b3, c3);

    let r = r1.min(r2).min(r3).floor();
    if r > 0.0 {
        r as usize
    } else {
        0
    }
}

/// Box footprint on the heatmap grid as `(length_cells, width_cells)`.
///
/// Length runs along the row axis (X) and width along the column axis (Y).
pub fn footprint(bbox: &Box3d, roi: &BoundaryConfig, heatmap: &HeatmapConfig) -> (f64, f64) {
    let length = (bbox.l / roi.size_x() * heatmap.rows() as f64).ceil();
    let width = (bbox.w / roi.size_y() * heatmap.cols() as f64).ceil();
    (length, width)
}

/// Radius of a box's Gaussian stamp on the heatmap grid.
pub fn box_radius(bbox: &Box3d, roi: &BoundaryConfig, heatmap: &HeatmapConfig) -> usize {
    compute_radius(footprint(bbox, roi, heatmap), heatmap.min_overlap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_footprint() {
        assert_eq!(compute_radius((0.0, 0.0), 0.7), 0);
    }

    #[test]
    fn test_known_values() {
        // o = 0.7, 10 x 10 cells: r3 is the binding case.
        // a3 = 2.8, b3 = -28, c3 = -30 -> (-28 + sqrt(784 + 336)) / 2 = 2.733
        assert_eq!(compute_radius((10.0, 10.0), 0.7), 2);
        assert_eq!(compute_radius((1.0, 1.0), 0.7), 0);
        assert_eq!(compute_radius((40.0, 40.0), 0.7), 10);
    }

    #[test]
    fn test_non_decreasing() {
        for o in [0.1, 0.5, 0.7, 0.9] {
            let mut prev_h = 0;
            for h in 0..60 {
                let mut prev_w = 0;
                for w in 0..60 {
                    let r = compute_radius((h as f64, w as f64), o);
                    assert!(r >= prev_w, "radius decreased along width at ({h}, {w}), o = {o}");
                    prev_w = r;
                }
                let r = compute_radius((h as f64, 10.0), o);
                assert!(r >= prev_h, "radius decreased along height at {h}, o = {o}");
                prev_h = r;
            }
        }
    }

    #[test]
    fn test_footprint() {
        let roi = BoundaryConfig::default();
        let heatmap = HeatmapConfig::default();
        let bbox = Box3d { l: 3.9, w: 1.6, h: 1.5, ..Box3d::default() };

        let (length, width) = footprint(&bbox, &roi, &heatmap);
        // 3.9 / 50 * 152 = 11.856, 1.6 / 50 * 152 = 4.864
        assert_eq!(length, 12.0);
        assert_eq!(width, 5.0);
        assert_eq!(box_radius(&bbox, &roi, &heatmap), compute_radius((12.0, 5.0), 0.7));
    }
}
