use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

const PREFIX: &str = "agro_scan";

/// An image staged on local disk for the classifier. The file is removed
/// when the value is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct ScopedTempFile {
    path: PathBuf,
}

impl ScopedTempFile {
    pub async fn write(dir: &Path, extension: &str, bytes: &[u8]) -> io::Result<Self> {
        let path = dir.join(unique_name(extension));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        // From here on Drop owns cleanup, including a failed write.
        let staged = Self { path };
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(staged)
    }

    pub async fn in_temp_dir(extension: &str, bytes: &[u8]) -> io::Result<Self> {
        Self::write(&std::env::temp_dir(), extension, bytes).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed temp file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

fn unique_name(extension: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}_{}_{:016x}{}", PREFIX, nanos, rand::random::<u64>(), extension)
}
