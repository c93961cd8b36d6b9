//! Sample access for a KITTI-style dataset on disk.
//!
//! Resolves a split list into sample ids and turns each id into an encoded
//! sample. The horizontal-flip decision of a training sample is drawn from an
//! RNG seeded by `seed + sample_id`, so repeated loads of the same sample
//! always agree.

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::PipelineConfig;
use crate::core::dataset::{read_split_ids, KittiLayout, Split};
use crate::core::loaders::{load_calibration, load_labels, load_velodyne_bin, LabelSet};

use super::sample::{
    Augmentation, BevSample, EncodedSample, Result, SampleEncoder, SampleError, SampleProvenance,
};

/// A split of a KITTI dataset bound to a pipeline configuration.
pub struct KittiDataset<'a> {
    config: &'a PipelineConfig,
    layout: KittiLayout,
    split: Split,
    ids: Vec<u32>,
    encoder: SampleEncoder<'a>,
}

impl<'a> KittiDataset<'a> {
    /// Read the split list (`val.txt` for the test split) and keep at most
    /// `dataset.num_samples` ids.
    pub fn open(config: &'a PipelineConfig, split: Split) -> Result<Self> {
        let layout = KittiLayout::new(&config.dataset);
        let split_file = layout.split_file(split);
        let ids = read_split_ids(&split_file)?;
        debug!("{} ids listed in {}", ids.len(), split_file.display());
        Ok(Self::from_ids(config, split, ids))
    }

    /// Use an explicit id list instead of a split file.
    pub fn from_ids(config: &'a PipelineConfig, split: Split, mut ids: Vec<u32>) -> Self {
        if let Some(limit) = config.dataset.num_samples {
            ids.truncate(limit);
        }
        Self {
            config,
            layout: KittiLayout::new(&config.dataset),
            split,
            ids,
            encoder: SampleEncoder::new(config),
        }
    }

    pub fn with_augmentation<A: Augmentation + 'static>(mut self, augmentation: A) -> Self {
        self.encoder = self.encoder.with_augmentation(augmentation);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn layout(&self) -> &KittiLayout {
        &self.layout
    }

    fn sample_id(&self, index: usize) -> Result<u32> {
        self.ids
            .get(index)
            .copied()
            .ok_or(SampleError::IndexOutOfRange {
                index,
                len: self.ids.len(),
            })
    }

    /// Deterministic flip decision; always false outside the train split.
    pub fn draw_hflip(&self, sample_id: u32) -> bool {
        if self.split != Split::Train {
            return false;
        }
        let seed = self.config.dataset.seed.wrapping_add(sample_id as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        rng.random::<f64>() < self.config.dataset.hflip_prob
    }

    fn provenance(&self, sample_id: u32, hflipped: bool) -> SampleProvenance {
        SampleProvenance {
            sample_id,
            lidar_path: self.layout.lidar_path(sample_id),
            image_path: self.layout.image_path(sample_id),
            hflipped,
        }
    }

    /// Load and encode the `index`-th sample of the split.
    pub fn load_sample(&self, index: usize) -> Result<EncodedSample> {
        let sample_id = self.sample_id(index)?;
        self.load_sample_id(sample_id, self.draw_hflip(sample_id))
    }

    /// Load and encode a sample by id with an explicit flip decision.
    ///
    /// Label files are only read for labeled splits.
    pub fn load_sample_id(&self, sample_id: u32, hflipped: bool) -> Result<EncodedSample> {
        let provenance = self.provenance(sample_id, hflipped);
        let cloud = load_velodyne_bin(&provenance.lidar_path)?;
        let calib = load_calibration(self.layout.calib_path(sample_id))?;
        let labels = if self.split.has_labels() {
            load_labels(self.layout.label_path(sample_id), &self.config.classes)?
        } else {
            LabelSet::unlabeled()
        };

        Ok(self
            .encoder
            .encode(&cloud, &calib, &labels, hflipped, provenance))
    }

    /// Rasterize the `index`-th sample without reading labels or calibration.
    pub fn load_bev_only(&self, index: usize) -> Result<BevSample> {
        let sample_id = self.sample_id(index)?;
        let provenance = self.provenance(sample_id, false);
        let cloud = load_velodyne_bin(&provenance.lidar_path)?;
        let bev = self.encoder.encode_bev_only(&cloud);
        Ok(BevSample { provenance, bev })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetConfig;
    use std::path::PathBuf;

    fn config(hflip_prob: f64, num_samples: Option<usize>) -> PipelineConfig {
        PipelineConfig {
            dataset: DatasetConfig {
                root: PathBuf::from("/nonexistent"),
                hflip_prob,
                num_samples,
                seed: 7,
                ..DatasetConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_from_ids_truncates() {
        let cfg = config(0.5, Some(2));
        let ds = KittiDataset::from_ids(&cfg, Split::Val, vec![4, 8, 15, 16]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.ids(), &[4, 8]);
    }

    #[test]
    fn test_draw_hflip() {
        let always = config(1.0, None);
        let never = config(0.0, None);
        let half = config(0.5, None);

        let train = KittiDataset::from_ids(&always, Split::Train, vec![]);
        let val = KittiDataset::from_ids(&always, Split::Val, vec![]);
        let train_never = KittiDataset::from_ids(&never, Split::Train, vec![]);
        let train_half = KittiDataset::from_ids(&half, Split::Train, vec![]);

        let mut flipped = 0;
        for id in 0..200 {
            assert!(train.draw_hflip(id));
            assert!(!val.draw_hflip(id));
            assert!(!train_never.draw_hflip(id));
            assert_eq!(train_half.draw_hflip(id), train_half.draw_hflip(id));
            if train_half.draw_hflip(id) {
                flipped += 1;
            }
        }
        assert!(flipped > 50 && flipped < 150, "flipped {flipped} of 200");
    }

    #[test]
    fn test_index_out_of_range() {
        let cfg = config(0.5, None);
        let ds = KittiDataset::from_ids(&cfg, Split::Val, vec![1]);
        assert!(matches!(
            ds.load_sample(3),
            Err(SampleError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_missing_files() {
        let cfg = config(0.5, None);
        assert!(matches!(
            KittiDataset::open(&cfg, Split::Train),
            Err(SampleError::Dataset(_))
        ));

        let ds = KittiDataset::from_ids(&cfg, Split::Val, vec![1]);
        assert!(matches!(ds.load_sample(0), Err(SampleError::Load(_))));
        assert!(matches!(ds.load_bev_only(0), Err(SampleError::Load(_))));
    }
}
