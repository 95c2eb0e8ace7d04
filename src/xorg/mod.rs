//! Xorg configuration generation and the on-disk configuration file

mod device;
mod document;

pub use device::{resolve_integrated_driver, ResolvedDriver};
pub use document::assemble_document;

use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write `text` to `path`, creating parent directories (0755).
///
/// The text goes to a sibling temporary file first and is renamed into
/// place, so readers never see a partially written configuration. On error
/// the temporary file is removed.
pub fn write_xorg_conf(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        DirBuilder::new().recursive(true).mode(0o755).create(parent)?;
    }

    let tmp = temporary_path(path);
    info!(path = %path.display(), "Writing Xorg configuration");

    let result = fs::write(&tmp, text).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Remove the generated configuration. Returns whether a file was removed.
pub fn cleanup_xorg_conf(path: &Path) -> io::Result<bool> {
    info!(path = %path.display(), "Removing Xorg configuration (if present)");
    let _ = fs::remove_file(temporary_path(path));

    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        // A file in place of the directory means nothing of ours exists
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
