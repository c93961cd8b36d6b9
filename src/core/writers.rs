//! Data writers for raw velodyne sweeps.
//!
//! Sweeps are written in the same layout the loaders read: little-endian
//! `f32` x, y, z, reflectance per point, no header.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::loaders::PointCloud;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a point cloud in the raw velodyne layout.
///
/// The output holds 16 bytes per point and no header, so it can be read back
/// with [`load_velodyne_bin`](super::loaders::load_velodyne_bin).
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `cloud` - Points to write, in order
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_velodyne_bin(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    for i in 0..cloud.len() {
        for v in cloud.point(i) {
            writer
                .write_all(&v.to_le_bytes())
                .map_err(|e| WriteError::WriteFile {
                    path: path_str.clone(),
                    source: e,
                })?;
        }
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_velodyne_bin;
    use std::fs;
    use tempfile::tempdir;

    fn create_test_cloud() -> PointCloud {
        PointCloud::from_points(&[
            [1.0, 4.0, 7.0, 0.1],
            [2.0, 5.0, 8.0, 0.2],
            [3.0, 6.0, -9.0, 0.3],
        ])
    }

    #[test]
    fn test_write_velodyne_bin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001.bin");
        let cloud = create_test_cloud();

        write_velodyne_bin(&path, &cloud).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 48);
        let loaded = load_velodyne_bin(&path).unwrap();
        assert_eq!(loaded, cloud);
    }

    #[test]
    fn test_write_velodyne_bin_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");

        write_velodyne_bin(&path, &PointCloud::new()).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_write_velodyne_bin_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("cloud.bin");

        write_velodyne_bin(&path, &create_test_cloud()).unwrap();

        assert!(path.exists());
    }
}
