//! Point and label filtering by field of view and region of interest.

use log::trace;

use crate::config::{BoundaryConfig, FovConfig};
use crate::core::loaders::{ObjectLabel3D, PointCloud};

/// Keep points whose bearing lies inside the horizontal field of view.
///
/// The bearing is `atan2(y, x)` in the sensor frame, so the field of view is
/// centered on the forward (+x) axis. A point is kept when
/// `|bearing| <= horizontal_deg / 2`. Point order is preserved.
///
/// # Arguments
///
/// * `cloud` - Input points
/// * `fov` - Field-of-view configuration
///
/// # Returns
///
/// A new cloud with the visible points.
pub fn filter_fov(cloud: &PointCloud, fov: &FovConfig) -> PointCloud {
    let half_fov = (fov.horizontal_deg / 2.0).to_radians();
    cloud.filtered(|p| (p[1] as f64).atan2(p[0] as f64).abs() <= half_fov)
}

/// Keep points inside the region of interest (closed interval on every axis).
pub fn filter_points(cloud: &PointCloud, roi: &BoundaryConfig) -> PointCloud {
    cloud.filtered(|p| roi.contains_point(p[0] as f64, p[1] as f64, p[2] as f64))
}

/// Keep labels whose center lies inside the region of interest.
///
/// Uses the half-open test `min <= c < max` on every axis.
pub fn filter_labels(labels: &[ObjectLabel3D], roi: &BoundaryConfig) -> Vec<ObjectLabel3D> {
    labels
        .iter()
        .filter(|label| {
            let b = &label.bbox;
            let inside = roi.contains_center(b.x, b.y, b.z);
            if !inside {
                trace!(
                    "dropping label {:?} centered at ({:.2}, {:.2}, {:.2}) outside the ROI",
                    label.category,
                    b.x,
                    b.y,
                    b.z
                );
            }
            inside
        })
        .copied()
        .collect()
}

/// Crop both points and labels to the region of interest.
///
/// The two sets are filtered independently.
pub fn filter_lidar(
    cloud: &PointCloud,
    labels: &[ObjectLabel3D],
    roi: &BoundaryConfig,
) -> (PointCloud, Vec<ObjectLabel3D>) {
    (filter_points(cloud, roi), filter_labels(labels, roi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{Box3d, Category};

    fn roi() -> BoundaryConfig {
        BoundaryConfig {
            min_x: 0.0,
            max_x: 50.0,
            min_y: -25.0,
            max_y: 25.0,
            min_z: -2.0,
            max_z: 4.0,
            discretization: 0.1,
        }
    }

    fn label_at(x: f64, y: f64, z: f64) -> ObjectLabel3D {
        ObjectLabel3D {
            category: Category::Real(1),
            bbox: Box3d { x, y, z, h: 1.5, w: 1.6, l: 3.9, yaw: 0.0 },
        }
    }

    #[test]
    fn test_filter_fov() {
        let cloud = PointCloud::from_points(&[
            [10.0, 0.0, 0.0, 0.1],
            [10.0, 9.9, 0.0, 0.2],   // just inside
            [10.0, -10.5, 0.0, 0.3], // just outside
            [-5.0, 0.0, 0.0, 0.4],   // behind
            [3.0, -1.0, 0.0, 0.5],
        ]);

        let kept = filter_fov(&cloud, &FovConfig { horizontal_deg: 90.0 });
        assert_eq!(kept.reflectance, vec![0.1, 0.2, 0.5]);
    }

    #[test]
    fn test_filter_fov_full_circle() {
        let cloud = PointCloud::from_points(&[[-5.0, 0.0, 0.0, 0.4], [0.0, -3.0, 0.0, 0.1]]);
        let kept = filter_fov(&cloud, &FovConfig { horizontal_deg: 360.0 });
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_filter_points_closed_interval() {
        let cloud = PointCloud::from_points(&[
            [0.0, -25.0, -2.0, 0.1],
            [50.0, 25.0, 4.0, 0.2],
            [50.1, 0.0, 0.0, 0.3],
            [10.0, 0.0, 4.5, 0.4],
        ]);

        let kept = filter_points(&cloud, &roi());
        assert_eq!(kept.reflectance, vec![0.1, 0.2]);
    }

    #[test]
    fn test_filter_labels_half_open() {
        let labels = vec![
            label_at(0.0, -25.0, -2.0),
            label_at(50.0, 0.0, 0.0),
            label_at(10.0, 25.0, 0.0),
            label_at(20.0, 5.0, -1.0),
        ];

        let kept = filter_labels(&labels, &roi());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].bbox.x, 0.0);
        assert_eq!(kept[1].bbox.x, 20.0);
    }

    #[test]
    fn test_filter_lidar() {
        let cloud = PointCloud::from_points(&[[1.0, 1.0, 0.0, 0.5], [-1.0, 1.0, 0.0, 0.5]]);
        let labels = vec![label_at(1.0, 1.0, 0.0), label_at(60.0, 0.0, 0.0)];

        let (points, kept) = filter_lidar(&cloud, &labels, &roi());
        assert_eq!(points.len(), 1);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_filter_empty() {
        assert!(filter_points(&PointCloud::new(), &roi()).is_empty());
        assert!(filter_labels(&[], &roi()).is_empty());
    }
}
