//! Artifact discovery.

use envinject_core::{Error, ExtensionFilter, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Collect every file under `root` whose extension passes `filter`.
///
/// The root must exist and be a readable directory. Symbolic links are not
/// followed. Paths are returned sorted so that processing order is stable.
pub async fn discover_artifacts(root: &Path, filter: &ExtensionFilter) -> Result<Vec<PathBuf>> {
    let metadata = tokio::fs::metadata(root).await.map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            Error::RootNotFound(root.to_path_buf())
        } else {
            Error::Walk {
                path: root.to_path_buf(),
                source,
            }
        }
    })?;

    if !metadata.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let mut artifacts = Vec::new();
    scan_directory(root, filter, &mut artifacts).await?;
    artifacts.sort();
    Ok(artifacts)
}

#[async_recursion::async_recursion]
async fn scan_directory(
    current_path: &Path,
    filter: &ExtensionFilter,
    artifacts: &mut Vec<PathBuf>,
) -> Result<()> {
    let walk_err = |source| Error::Walk {
        path: current_path.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(current_path).await.map_err(walk_err)?;

    while let Some(entry) = entries.next_entry().await.map_err(walk_err)? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|source| Error::Walk {
            path: path.clone(),
            source,
        })?;

        if file_type.is_symlink() {
            debug!(path = %path.display(), "Skipping symlink");
        } else if file_type.is_dir() {
            scan_directory(&path, filter, artifacts).await?;
        } else if file_type.is_file() && filter.matches(&path) {
            artifacts.push(path);
        }
    }

    Ok(())
}
