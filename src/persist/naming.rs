//! Photo file naming.
//!
//! Files are named `IMG_<YYYYMMDD_HHmmss>.jpg` inside
//! `<pictures_root>/<app_folder>`. Names only resolve to the second; two
//! captures within the same second write the same path and the later one
//! replaces the earlier.

use crate::config::StorageConfig;
use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;

/// Builds destination paths for captured stills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoNaming {
    directory: PathBuf,
}

impl PhotoNaming {
    /// Names files under `<pictures_root>/<app_folder>`.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            directory: config.pictures_root.join(&config.app_folder),
        }
    }

    /// Directory all stills are written into.
    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    /// File name for a capture taken at `taken`.
    pub fn file_name(taken: &NaiveDateTime) -> String {
        format!("IMG_{}.jpg", taken.format("%Y%m%d_%H%M%S"))
    }

    /// Full path for a capture taken at `taken`.
    pub fn path_for(&self, taken: &NaiveDateTime) -> PathBuf {
        self.directory.join(Self::file_name(taken))
    }

    /// Full path for a capture taken now, in local time.
    pub fn next_path(&self) -> PathBuf {
        self.path_for(&Local::now().naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn storage() -> StorageConfig {
        StorageConfig {
            pictures_root: PathBuf::from("/data/DCIM"),
            app_folder: "Camera".to_owned(),
        }
    }

    #[test]
    fn test_path_pattern() {
        let taken = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 2)
            .unwrap();
        let naming = PhotoNaming::new(&storage());
        assert_eq!(
            naming.path_for(&taken),
            PathBuf::from("/data/DCIM/Camera/IMG_20240309_070502.jpg")
        );
    }

    #[test]
    fn test_same_second_collides() {
        let taken = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 2, 10)
            .unwrap();
        let later = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 2, 990)
            .unwrap();
        let naming = PhotoNaming::new(&storage());
        assert_eq!(naming.path_for(&taken), naming.path_for(&later));
    }
}
