use std::path::{Path, PathBuf};

use uuid::Uuid;

/// An uploaded image persisted under a generated name. The file is removed
/// when the guard is dropped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Writes `bytes` to `<dir>/<uuid>`. The client-supplied filename is never
    /// used on disk.
    pub async fn persist(dir: &Path, bytes: &[u8]) -> std::io::Result<Self> {
        let path = dir.join(Uuid::new_v4().simple().to_string());
        // Build the guard first so a failed write still cleans up.
        let upload = TempUpload { path };
        tokio::fs::write(&upload.path, bytes).await?;
        Ok(upload)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "failed to remove upload: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("upload-test-{name}-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn file_is_removed_on_drop() {
        let dir = scratch_dir("drop");
        let upload = TempUpload::persist(&dir, b"payload").await.unwrap();
        let path = upload.path().to_path_buf();
        assert_eq!(upload.read().unwrap(), b"payload");
        drop(upload);
        assert!(!path.exists());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn concurrent_uploads_get_distinct_paths() {
        let dir = scratch_dir("distinct");
        let a = TempUpload::persist(&dir, b"a").await.unwrap();
        let b = TempUpload::persist(&dir, b"b").await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.read().unwrap(), b"a");
        assert_eq!(b.read().unwrap(), b"b");
        drop((a, b));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn write_into_missing_dir_fails_cleanly() {
        let dir = std::env::temp_dir().join(format!("upload-missing-{}", Uuid::new_v4()));
        assert!(TempUpload::persist(&dir, b"x").await.is_err());
    }
}
