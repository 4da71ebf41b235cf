//! Output naming and all-or-nothing file commit.
//!
//! The formatted text is written to a temporary file in the target's
//! directory, flushed to disk, then renamed over the target. A reader
//! therefore sees either the previous file (or none) or the complete new
//! content, never a truncated one. Same-directory placement keeps the
//! rename on one filesystem.

use crate::error::FileError;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Derive the output path for `input`.
///
/// The final extension of the last path component (everything from its
/// last `.`) is replaced by `.{extension}`; a component without a `.` just
/// gets `.{extension}` appended. Directory components are never touched.
///
/// ```rust
/// use edgequake_ocr2md::pipeline::write::output_path_for;
/// use std::path::Path;
///
/// assert_eq!(output_path_for(Path::new("scans/page.v2.png"), "md"), Path::new("scans/page.v2.md"));
/// assert_eq!(output_path_for(Path::new("scans.d/README"), "md"), Path::new("scans.d/README.md"));
/// ```
pub fn output_path_for(input: &Path, extension: &str) -> PathBuf {
    let Some(name) = input.file_name() else {
        let mut raw: OsString = input.as_os_str().to_owned();
        raw.push(".");
        raw.push(extension);
        return PathBuf::from(raw);
    };

    let name = name.to_string_lossy();
    let stem = match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => &name[..],
    };
    input.with_file_name(format!("{stem}.{extension}"))
}

/// Commit `content` to `path` atomically. Returns the number of bytes
/// written.
///
/// Runs on the blocking pool; the file is `fsync`ed before the rename.
pub async fn write_output(path: &Path, content: Vec<u8>) -> Result<usize, FileError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&target, &content))
        .await
        .map_err(|e| FileError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(format!("write task panicked: {e}")),
        })?
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<usize, FileError> {
    let wrap = |source: std::io::Error| FileError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    tmp.write_all(content).map_err(wrap)?;
    tmp.as_file().sync_all().map_err(wrap)?;
    set_output_permissions(path, tmp.as_file()).map_err(wrap)?;
    tmp.persist(path).map_err(|e| wrap(e.error))?;

    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(content.len())
}

/// Temp files are created owner-only; give the output the permissions of
/// the file it replaces, or `0644` when it is new.
#[cfg(unix)]
fn set_output_permissions(path: &Path, file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let perms = match std::fs::metadata(path) {
        Ok(meta) => meta.permissions(),
        Err(_) => std::fs::Permissions::from_mode(0o644),
    };
    file.set_permissions(perms)
}

#[cfg(not(unix))]
fn set_output_permissions(_path: &Path, _file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}
