//! Per-sample orchestration: frame conversion, cropping, optional
//! augmentation, rasterization and target encoding.

use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::dataset::DatasetError;
use crate::core::loaders::{Calibration, LabelSet, LoaderError, ObjectLabel3D, PointCloud};
use crate::core::transforms::label_set_to_lidar;

use super::bev::{make_bev_map, BevGrid};
use super::filtering::{filter_fov, filter_labels, filter_lidar, filter_points};
use super::heatmap::{build_targets, HeatmapTargets};

/// Errors raised while loading or encoding a sample.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error(transparent)]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("sample index {index} out of range ({len} samples)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Result type for sample operations.
pub type Result<T> = std::result::Result<T, SampleError>;

/// Point/label transformation applied between the two boundary crops.
///
/// Receives LiDAR-frame data that already passed the field-of-view and
/// boundary filters. Called at most once per sample.
pub trait Augmentation: Send + Sync {
    fn augment(
        &self,
        cloud: PointCloud,
        labels: Vec<ObjectLabel3D>,
    ) -> (PointCloud, Vec<ObjectLabel3D>);
}

impl<F> Augmentation for F
where
    F: Fn(PointCloud, Vec<ObjectLabel3D>) -> (PointCloud, Vec<ObjectLabel3D>) + Send + Sync,
{
    fn augment(
        &self,
        cloud: PointCloud,
        labels: Vec<ObjectLabel3D>,
    ) -> (PointCloud, Vec<ObjectLabel3D>) {
        self(cloud, labels)
    }
}

/// Where a sample came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleProvenance {
    pub sample_id: u32,
    pub lidar_path: PathBuf,
    /// Paired camera image; never opened by the pipeline.
    pub image_path: PathBuf,
    pub hflipped: bool,
}

/// BEV grid plus training targets for one sample.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub provenance: SampleProvenance,
    pub bev: BevGrid,
    pub targets: HeatmapTargets,
    /// LiDAR-frame labels that survived cropping, before encoding.
    pub labels: Vec<ObjectLabel3D>,
    pub num_points: usize,
}

/// BEV grid of an unlabeled sample.
#[derive(Debug, Clone)]
pub struct BevSample {
    pub provenance: SampleProvenance,
    pub bev: BevGrid,
}

/// Turns raw sample data into network inputs and targets.
pub struct SampleEncoder<'a> {
    config: &'a PipelineConfig,
    augmentation: Option<Box<dyn Augmentation>>,
}

impl<'a> SampleEncoder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            augmentation: None,
        }
    }

    /// Attach an augmentation applied between the two boundary crops.
    pub fn with_augmentation<A: Augmentation + 'static>(mut self, augmentation: A) -> Self {
        self.augmentation = Some(Box::new(augmentation));
        self
    }

    /// Encode one labeled sample.
    ///
    /// Labels are converted to the LiDAR frame only when `label_set` carries
    /// real labels; the placeholder row of an unlabeled set is cropped and
    /// then rejected by the encoder for its zero size, leaving every mask at 0.
    pub fn encode(
        &self,
        cloud: &PointCloud,
        calib: &Calibration,
        label_set: &LabelSet,
        hflipped: bool,
        mut provenance: SampleProvenance,
    ) -> EncodedSample {
        let cfg = self.config;
        provenance.hflipped = hflipped;

        let labels = label_set_to_lidar(calib, label_set);

        let visible = filter_fov(cloud, &cfg.fov);
        let (mut points, mut labels) = filter_lidar(&visible, &labels, &cfg.boundary);
        debug!(
            "sample {}: {} -> {} points after FOV, {} after crop, {} labels",
            provenance.sample_id,
            cloud.len(),
            visible.len(),
            points.len(),
            labels.len()
        );

        if let Some(augmentation) = &self.augmentation {
            let (aug_points, aug_labels) = augmentation.augment(points, labels);
            points = filter_points(&aug_points, &cfg.boundary);
            labels = filter_labels(&aug_labels, &cfg.boundary);
            debug!(
                "sample {}: {} points, {} labels after augmentation",
                provenance.sample_id,
                points.len(),
                labels.len()
            );
        }

        let mut bev = make_bev_map(&points, &cfg.boundary);
        if hflipped {
            bev.flip_columns();
        }
        let targets = build_targets(&labels, hflipped, &cfg.boundary, &cfg.heatmap);

        EncodedSample {
            provenance,
            bev,
            targets,
            labels,
            num_points: points.len(),
        }
    }

    /// Rasterize an unlabeled sample (field of view, crop, BEV).
    pub fn encode_bev_only(&self, cloud: &PointCloud) -> BevGrid {
        let cfg = self.config;
        let visible = filter_fov(cloud, &cfg.fov);
        let points = filter_points(&visible, &cfg.boundary);
        make_bev_map(&points, &cfg.boundary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryConfig, HeatmapConfig};
    use crate::core::loaders::{Box3d, Category};
    use crate::processors::bev::BevChannel;
    use nalgebra::{Matrix3, Matrix3x4};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn calib() -> Calibration {
        let v2c = Matrix3x4::new(
            0.0, -1.0, 0.0, 0.0, //
            0.0, 0.0, -1.0, 0.0, //
            1.0, 0.0, 0.0, 0.0,
        );
        Calibration::new(Matrix3x4::identity(), Matrix3::identity(), v2c).unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            boundary: BoundaryConfig {
                min_x: 0.0,
                max_x: 50.0,
                min_y: -25.0,
                max_y: 25.0,
                min_z: -2.0,
                max_z: 4.0,
                discretization: 0.5,
            },
            heatmap: HeatmapConfig {
                size: [100, 100],
                max_objects: 4,
                ..HeatmapConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    /// Car at LiDAR (20, 5, -1) written in camera coordinates.
    fn car_labels() -> LabelSet {
        LabelSet {
            labels: vec![ObjectLabel3D {
                category: Category::Real(1),
                bbox: Box3d { x: -5.0, y: 1.0, z: 20.0, h: 1.5, w: 1.6, l: 3.9, yaw: 0.3 },
            }],
            annotations: Vec::new(),
            has_labels: true,
        }
    }

    fn cloud() -> PointCloud {
        PointCloud::from_points(&[
            [20.0, 5.0, -0.5, 0.4],
            [10.0, 0.0, 0.0, 0.5],
            [-3.0, 0.0, 0.0, 0.9], // behind the sensor
            [10.0, 30.0, 0.0, 0.9], // outside the FOV
        ])
    }

    #[test]
    fn test_encode_labeled_sample() {
        let cfg = config();
        let encoder = SampleEncoder::new(&cfg);
        let sample = encoder.encode(&cloud(), &calib(), &car_labels(), false, SampleProvenance::default());

        assert_eq!(sample.num_points, 2);
        assert_eq!(sample.bev.shape(), [100, 100, 3]);
        assert_eq!(sample.bev.occupied_cells(), 2);
        assert!(sample.bev.get(40, 60, BevChannel::Density) > 0.0);

        assert_eq!(sample.labels.len(), 1);
        assert!((sample.labels[0].bbox.x - 20.0).abs() < 1e-9);
        assert_eq!(sample.targets.num_objects(), 1);
        assert_eq!(sample.targets.indices[0], 40 * 100 + 60);
        assert_eq!(sample.targets.heat(1, 40, 60), 1.0);
        assert!(!sample.provenance.hflipped);
    }

    #[test]
    fn test_encode_flipped_sample() {
        let cfg = config();
        let encoder = SampleEncoder::new(&cfg);
        let plain = encoder.encode(&cloud(), &calib(), &car_labels(), false, SampleProvenance::default());
        let flipped = encoder.encode(&cloud(), &calib(), &car_labels(), true, SampleProvenance::default());

        assert!(flipped.provenance.hflipped);
        assert!(flipped.bev.get(40, 39, BevChannel::Density) > 0.0);
        assert_eq!(flipped.bev.get(40, 60, BevChannel::Density), 0.0);
        assert_eq!(flipped.targets.heat(1, 40, 39), 1.0);
        assert_eq!(flipped.targets.directions[0][0], -plain.targets.directions[0][0]);
    }

    #[test]
    fn test_encode_without_labels() {
        let cfg = config();
        let encoder = SampleEncoder::new(&cfg);
        let empty = LabelSet {
            labels: vec![ObjectLabel3D::placeholder()],
            annotations: Vec::new(),
            has_labels: false,
        };

        let sample = encoder.encode(&cloud(), &calib(), &empty, false, SampleProvenance::default());
        assert!(sample.targets.mask.iter().all(|&m| m == 0));
        assert!(sample.targets.heatmaps.iter().all(|&v| v == 0.0));
        assert_eq!(sample.num_points, 2);
    }

    #[test]
    fn test_augmentation_runs_once_and_is_recropped() {
        let cfg = config();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let encoder = SampleEncoder::new(&cfg).with_augmentation(
            move |cloud: PointCloud, labels: Vec<ObjectLabel3D>| {
                counter.fetch_add(1, Ordering::SeqCst);
                // shift everything 35 m forward: the car leaves the ROI
                let mut moved = PointCloud::with_capacity(cloud.len());
                for i in 0..cloud.len() {
                    let [x, y, z, r] = cloud.point(i);
                    moved.push(x + 35.0, y, z, r);
                }
                let labels: Vec<ObjectLabel3D> = labels
                    .into_iter()
                    .map(|mut l| {
                        l.bbox.x += 35.0;
                        l
                    })
                    .collect();
                (moved, labels)
            },
        );

        let sample = encoder.encode(&cloud(), &calib(), &car_labels(), false, SampleProvenance::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sample.num_points, 1);
        assert!(sample.labels.is_empty());
        assert_eq!(sample.targets.num_objects(), 0);
    }

    #[test]
    fn test_encode_bev_only() {
        let cfg = config();
        let encoder = SampleEncoder::new(&cfg);
        let bev = encoder.encode_bev_only(&cloud());

        assert_eq!(bev.occupied_cells(), 2);
        assert!(bev.get(20, 50, BevChannel::Density) > 0.0);
    }

    #[test]
    fn test_empty_cloud() {
        let cfg = config();
        let encoder = SampleEncoder::new(&cfg);
        let sample = encoder.encode(&PointCloud::new(), &calib(), &car_labels(), false, SampleProvenance::default());

        assert!(sample.bev.data().iter().all(|&v| v == 0.0));
        assert_eq!(sample.targets.num_objects(), 1);
    }
}
