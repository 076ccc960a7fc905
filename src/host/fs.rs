//! Local filesystem storage.

use super::StorageSink;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Writes files with `std::fs`, syncing before close.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl StorageSink for FsStorage {
    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut output = File::create(path)?;
        output.write_all(bytes)?;
        output.sync_all()
    }
}
