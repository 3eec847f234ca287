//! Workdir-rooted file storage for uploads and downloads.
//!
//! Every path is confined to the agent working directory: uploads keep only
//! their base name, and download paths may not escape through `..` or
//! absolute components.

use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tracing::debug;

/// Store an uploaded file under `workdir`, keeping only the base name.
///
/// Returns the name the file was stored as.
pub async fn save_upload(workdir: &Path, file_name: &str, data: &[u8]) -> io::Result<String> {
    let base = Path::new(file_name)
        .file_name()
        .ok_or_else(|| io::Error::other(format!("no file name in '{file_name}'")))?;
    let target = workdir.join(base);
    tokio::fs::write(&target, data).await?;
    debug!(path = %target.display(), bytes = data.len(), "stored upload");
    Ok(base.to_string_lossy().into_owned())
}

/// Resolve a requested download path against `workdir`.
///
/// Returns `None` when the path is empty or would step outside the
/// working directory.
fn resolve(workdir: &Path, requested: &str) -> Option<PathBuf> {
    let mut resolved = workdir.to_path_buf();
    let mut any = false;
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                any = true;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    if any {
        Some(resolved)
    } else {
        None
    }
}

/// Open a file for download.
///
/// Returns the open handle so the caller can stream it out instead of
/// buffering the whole file. Returns `Ok(None)` when the path is missing,
/// not a regular file, or not inside the working directory.
pub async fn open_file(workdir: &Path, requested: &str) -> io::Result<Option<File>> {
    let Some(path) = resolve(workdir, requested) else {
        debug!(requested = %requested, "rejected path outside workdir");
        return Ok(None);
    };
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let meta = file.metadata().await?;
    if !meta.is_file() {
        return Ok(None);
    }
    debug!(path = %path.display(), bytes = meta.len(), "serving download");
    Ok(Some(file))
}
