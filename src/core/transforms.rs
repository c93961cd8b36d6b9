//! Coordinate transformations between the LiDAR and rectified camera frames.
//!
//! Points and boxes move between frames through the rigid LiDAR→camera
//! transform `V2C` and the rectification rotation `R0`:
//!
//! - LiDAR → camera: `p_cam = R0 · (V2C · [p; 1])`
//! - camera → LiDAR: `p = C2V · [R0⁻¹ · p_cam; 1]`
//!
//! Box yaw maps as `yaw_lidar = -yaw_cam - π/2`, which is its own inverse.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Matrix3x4, Point3, Vector3, Vector4};

use super::loaders::{Box3d, Calibration, LabelSet, ObjectLabel3D};

/// Invert a rigid 3×4 transform `[R | t]` as `[Rᵀ | -Rᵀt]`.
pub fn inverse_rigid_transform(tr: &Matrix3x4<f64>) -> Matrix3x4<f64> {
    let rot_t = tr.fixed_view::<3, 3>(0, 0).transpose();
    let trans = tr.fixed_view::<3, 1>(0, 3).into_owned();

    let mut inv = Matrix3x4::zeros();
    inv.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot_t);
    inv.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-rot_t * trans));
    inv
}

#[inline]
fn apply_affine(tr: &Matrix3x4<f64>, p: &Point3<f64>) -> Point3<f64> {
    Point3::from(tr * Vector4::new(p.x, p.y, p.z, 1.0))
}

/// Map a rectified-camera point into the LiDAR frame.
pub fn camera_to_lidar_point(calib: &Calibration, p: &Point3<f64>) -> Point3<f64> {
    let unrectified = Point3::from(calib.r0_inv() * p.coords);
    apply_affine(calib.c2v(), &unrectified)
}

/// Map a LiDAR point into the rectified-camera frame.
pub fn lidar_to_camera_point(calib: &Calibration, p: &Point3<f64>) -> Point3<f64> {
    let cam = apply_affine(calib.v2c(), p);
    Point3::from(calib.r0() * cam.coords)
}

#[inline]
fn convert_yaw(yaw: f64) -> f64 {
    -yaw - FRAC_PI_2
}

/// Convert camera-frame boxes to LiDAR frame. Dimensions are unchanged.
pub fn camera_to_lidar_box(calib: &Calibration, boxes: &[Box3d]) -> Vec<Box3d> {
    boxes
        .iter()
        .map(|b| {
            let c = camera_to_lidar_point(calib, &Point3::new(b.x, b.y, b.z));
            Box3d {
                x: c.x,
                y: c.y,
                z: c.z,
                yaw: convert_yaw(b.yaw),
                ..*b
            }
        })
        .collect()
}

/// Convert LiDAR-frame boxes back to camera frame.
pub fn lidar_to_camera_box(calib: &Calibration, boxes: &[Box3d]) -> Vec<Box3d> {
    boxes
        .iter()
        .map(|b| {
            let c = lidar_to_camera_point(calib, &Point3::new(b.x, b.y, b.z));
            Box3d {
                x: c.x,
                y: c.y,
                z: c.z,
                yaw: convert_yaw(b.yaw),
                ..*b
            }
        })
        .collect()
}

/// Convert every label of a set to the LiDAR frame, keeping categories.
pub fn labels_to_lidar(calib: &Calibration, labels: &[ObjectLabel3D]) -> Vec<ObjectLabel3D> {
    let boxes: Vec<Box3d> = labels.iter().map(|l| l.bbox).collect();
    camera_to_lidar_box(calib, &boxes)
        .into_iter()
        .zip(labels)
        .map(|(bbox, label)| ObjectLabel3D {
            category: label.category,
            bbox,
        })
        .collect()
}

/// LiDAR-frame labels of a set.
///
/// Only a set that carries real labels is converted; the placeholder row of
/// an unlabeled set is returned untouched.
pub fn label_set_to_lidar(calib: &Calibration, set: &LabelSet) -> Vec<ObjectLabel3D> {
    if set.has_labels {
        labels_to_lidar(calib, &set.labels)
    } else {
        set.labels.clone()
    }
}

/// Project rectified-camera points through a 3×4 projection matrix.
///
/// Returns pixel coordinates and the depth (third homogeneous component) of
/// each point. Points with a non-positive depth produce meaningless pixel
/// coordinates and should be discarded by the caller.
///
/// # Arguments
///
/// * `points` - Points in the rectified camera frame
/// * `p` - Projection matrix, e.g. [`Calibration::p2`]
pub fn project_to_image(points: &[Point3<f64>], p: &Matrix3x4<f64>) -> Vec<([f64; 2], f64)> {
    points
        .iter()
        .map(|pt| {
            let uvw: Vector3<f64> = p * pt.to_homogeneous();
            let depth = uvw.z;
            ([uvw.x / depth, uvw.y / depth], depth)
        })
        .collect()
}
