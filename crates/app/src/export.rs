//! Writing markdown exports to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use keepmd_core::export::{ExportFile, EXPORT_FOLDER};

/// Write `files` into `<dir>/notes/`, returning the paths written.
///
/// Existing files with the same names are overwritten.
pub fn write_export(dir: &Path, files: &[ExportFile]) -> io::Result<Vec<PathBuf>> {
    let target = dir.join(EXPORT_FOLDER);
    fs::create_dir_all(&target)?;

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = target.join(&file.filename);
        fs::write(&path, &file.content)?;
        written.push(path);
    }

    tracing::info!(dir = %target.display(), count = written.len(), "Exported notes");
    Ok(written)
}
