//! Artifact storage seam.

use async_trait::async_trait;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Reads and rewrites artifact contents.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of an existing artifact.
    async fn write(&self, path: &Path, content: Vec<u8>) -> io::Result<()>;
}

/// Local filesystem store.
///
/// Writes go to a temporary file in the artifact's directory which is then
/// renamed over the original, so a failed write leaves the original intact.
/// The original file's permissions are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactStore;

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, content: Vec<u8>) -> io::Result<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(io::Error::other)?
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.as_file().set_permissions(permissions)?;

    // Atomic rename
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
