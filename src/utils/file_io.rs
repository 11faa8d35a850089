use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use tracing::error;

use crate::Error;
use crate::Result;

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.exists() {
            if let Err(e) = create_dir_all(parent_dir) {
                error!("Failed to create directory {:?}: {:?}", parent_dir, e);
                return Err(Error::Fatal(format!(
                    "Failed to create directory {:?}: {}",
                    parent_dir, e
                )));
            }
        }
    }
    Ok(())
}

/// Opens `path` for appending, creating missing parent directories first.
pub fn open_file_for_append(path: &Path) -> Result<File> {
    create_parent_dir_if_not_exist(path)?;
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| Error::Fatal(format!("Failed to open {:?} for append: {}", path, e)))
}
