//! Low-level fsync operations and the atomic file write built on them.
//!
//! Both file and directory fsyncs are required for crash safety: creating or
//! renaming a file updates the directory entry, and without syncing the
//! directory that entry may not survive a power loss even if the contents did.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created or renamed in it are durable.
///
/// Only meaningful for directory paths.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Writes `contents` to `dir/file_name` so that readers observe either the
/// previous state or the complete new file, never a prefix.
///
/// 1. Write to `<file_name>.tmp`
/// 2. fsync the temp file
/// 3. Rename over `<file_name>`
/// 4. fsync the directory
pub fn write_atomic(dir: &Path, file_name: &str, contents: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let temp_path = dir.join(format!("{file_name}.tmp"));
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(contents)?;
        fsync_file(&file)?;
    }
    std::fs::rename(&temp_path, dir.join(file_name))?;
    fsync_dir(dir)
}
