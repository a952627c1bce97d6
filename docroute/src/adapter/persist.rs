//! Crash-safe file replacement.
//!
//! Bytes go to a temporary file in the destination directory which is then
//! renamed over the target, so readers never observe a half-written file.

use crate::error::{DocRouteError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically replace `path` with `bytes`, creating parent directories as needed.
pub async fn atomic_write(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_blocking(&path, &bytes))
        .await
        .map_err(|e| DocRouteError::Storage(format!("write task failed: {e}")))?
}

fn write_blocking(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| DocRouteError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_creates_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("db.json");

        atomic_write(&path, b"{\"a\":1}".to_vec()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");

        atomic_write(&path, b"{\"a\":2}".to_vec()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");

        // No temp files left behind
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
