//! KITTI directory layout and split lists.
//!
//! A dataset root looks like:
//!
//! ```text
//! {root}/ImageSets/{train,val}.txt
//! {root}/{sub_folder}/velodyne/000000.bin
//! {root}/{sub_folder}/calib/000000.txt
//! {root}/{sub_folder}/label_2/000000.txt
//! {root}/{sub_folder}/image_2/000000.png
//! ```
//!
//! Folder names come from [`DatasetConfig`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::config::DatasetConfig;

/// Errors raised while resolving dataset paths and split files.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read split file '{path}': {source}")]
    ReadSplit {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sample id '{value}' on line {line} of '{path}'")]
    InvalidId {
        path: String,
        line: usize,
        value: String,
    },

    #[error("unknown split '{0}' (expected train, val or test)")]
    UnknownSplit(String),
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Dataset partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Val,
    /// Unlabeled inference; reads the validation id list.
    Test,
}

impl Split {
    /// Name of the id list under the split directory.
    pub fn list_file(&self) -> &'static str {
        match self {
            Split::Train => "train.txt",
            Split::Val | Split::Test => "val.txt",
        }
    }

    /// Whether samples of this split carry labels.
    #[inline]
    pub fn has_labels(&self) -> bool {
        !matches!(self, Split::Test)
    }
}

impl FromStr for Split {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(DatasetError::UnknownSplit(other.to_string())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        };
        f.write_str(name)
    }
}

/// Resolved file locations for one dataset root.
#[derive(Debug, Clone, PartialEq)]
pub struct KittiLayout {
    split_dir: PathBuf,
    lidar_dir: PathBuf,
    calib_dir: PathBuf,
    label_dir: PathBuf,
    image_dir: PathBuf,
}

impl KittiLayout {
    pub fn new(cfg: &DatasetConfig) -> Self {
        let data = cfg.root.join(&cfg.sub_folder);
        Self {
            split_dir: cfg.root.join(&cfg.split_dir),
            lidar_dir: data.join(&cfg.lidar_dir),
            calib_dir: data.join(&cfg.calib_dir),
            label_dir: data.join(&cfg.label_dir),
            image_dir: data.join(&cfg.image_dir),
        }
    }

    pub fn split_file(&self, split: Split) -> PathBuf {
        self.split_dir.join(split.list_file())
    }

    pub fn lidar_path(&self, id: u32) -> PathBuf {
        self.lidar_dir.join(format!("{:06}.bin", id))
    }

    pub fn calib_path(&self, id: u32) -> PathBuf {
        self.calib_dir.join(format!("{:06}.txt", id))
    }

    pub fn label_path(&self, id: u32) -> PathBuf {
        self.label_dir.join(format!("{:06}.txt", id))
    }

    /// Paired camera image; recorded for provenance, never opened.
    pub fn image_path(&self, id: u32) -> PathBuf {
        self.image_dir.join(format!("{:06}.png", id))
    }
}

/// Parse a split list: one integer sample id per non-blank line.
pub fn parse_split_ids(text: &str, source: &Path) -> Result<Vec<u32>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let value = line.trim();
            value.parse::<u32>().map_err(|_| DatasetError::InvalidId {
                path: source.display().to_string(),
                line: idx + 1,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Read a split list file from disk.
pub fn read_split_ids(path: &Path) -> Result<Vec<u32>> {
    let text = fs::read_to_string(path).map_err(|e| DatasetError::ReadSplit {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_split_ids(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_parsing() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("VAL".parse::<Split>().unwrap(), Split::Val);
        assert_eq!("test".parse::<Split>().unwrap(), Split::Test);
        assert!("trainval".parse::<Split>().is_err());

        assert_eq!(Split::Test.to_string(), "test");
        assert_eq!(Split::Test.list_file(), "val.txt");
        assert!(!Split::Test.has_labels());
        assert!(Split::Val.has_labels());
    }

    #[test]
    fn test_layout_paths() {
        let cfg = DatasetConfig {
            root: PathBuf::from("/data/kitti"),
            ..DatasetConfig::default()
        };
        let layout = KittiLayout::new(&cfg);

        assert_eq!(
            layout.lidar_path(42),
            PathBuf::from("/data/kitti/training/velodyne/000042.bin")
        );
        assert_eq!(
            layout.calib_path(7),
            PathBuf::from("/data/kitti/training/calib/000007.txt")
        );
        assert_eq!(
            layout.label_path(123456),
            PathBuf::from("/data/kitti/training/label_2/123456.txt")
        );
        assert_eq!(
            layout.image_path(1),
            PathBuf::from("/data/kitti/training/image_2/000001.png")
        );
        assert_eq!(
            layout.split_file(Split::Test),
            PathBuf::from("/data/kitti/ImageSets/val.txt")
        );
    }

    #[test]
    fn test_read_split_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("train.txt");
        fs::write(&path, "000000\n000003\n\n7\n").unwrap();

        let ids = read_split_ids(&path).unwrap();
        assert_eq!(ids, vec![0, 3, 7]);
    }

    #[test]
    fn test_read_split_ids_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            read_split_ids(&missing),
            Err(DatasetError::ReadSplit { .. })
        ));

        let bad = dir.path().join("bad.txt");
        fs::write(&bad, "1\nabc\n").unwrap();
        match read_split_ids(&bad) {
            Err(DatasetError::InvalidId { line, value, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("expected InvalidId, got {:?}", other),
        }
    }
}
