//! On-disk layout of uploads, per-task scratch space and outputs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use vtrack_models::TaskId;

#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_frames_dir: PathBuf,
    pub tracking_results_dir: PathBuf,
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::under(".")
    }
}

impl WorkspaceLayout {
    /// All four directories beneath one root.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            upload_dir: root.join("uploads"),
            output_dir: root.join("outputs"),
            temp_frames_dir: root.join("temp_frames"),
            tracking_results_dir: root.join("tracking_results"),
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let dir = |key: &str, fallback: PathBuf| std::env::var(key).map(PathBuf::from).unwrap_or(fallback);
        Self {
            upload_dir: dir("UPLOAD_FOLDER", defaults.upload_dir),
            output_dir: dir("OUTPUT_FOLDER", defaults.output_dir),
            temp_frames_dir: dir("TEMP_FRAMES_DIR", defaults.temp_frames_dir),
            tracking_results_dir: dir("TRACKING_RESULTS_DIR", defaults.tracking_results_dir),
        }
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.upload_dir,
            &self.output_dir,
            &self.temp_frames_dir,
            &self.tracking_results_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Extracted source frames for a task.
    pub fn frames_dir(&self, id: &TaskId) -> PathBuf {
        self.temp_frames_dir.join(id.as_str())
    }

    /// Annotated frames for a task.
    pub fn results_dir(&self, id: &TaskId) -> PathBuf {
        self.tracking_results_dir.join(id.as_str())
    }

    pub fn output_path(&self, id: &TaskId) -> PathBuf {
        self.output_dir.join(format!("{}_result.mp4", id))
    }

    pub fn upload_path(&self, file_id: &str, extension: &str) -> PathBuf {
        self.upload_dir.join(format!("{}.{}", file_id, extension))
    }

    /// Locate an uploaded video by its file id, whatever its extension.
    pub async fn find_upload(&self, file_id: &str) -> std::io::Result<Option<PathBuf>> {
        if !is_safe_id(file_id) {
            return Ok(None);
        }

        let mut entries = match tokio::fs::read_dir(&self.upload_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(file_id) && entry.file_type().await?.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Remove a task's transient artifacts. Repeated calls are no-ops.
    ///
    /// Returns how many directories were actually removed. The output video
    /// is kept.
    pub async fn cleanup(&self, id: &TaskId) -> std::io::Result<usize> {
        if !is_safe_id(id.as_str()) {
            return Ok(0);
        }

        let mut removed = 0;
        for dir in [self.frames_dir(id), self.results_dir(id)] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    debug!(dir = %dir.display(), "Removed task directory");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

/// Ids become path components, so only plain id characters are accepted.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths() {
        let layout = WorkspaceLayout::under("/data");
        let id = TaskId::from_string("abc");

        assert_eq!(layout.frames_dir(&id), PathBuf::from("/data/temp_frames/abc"));
        assert_eq!(layout.results_dir(&id), PathBuf::from("/data/tracking_results/abc"));
        assert_eq!(layout.output_path(&id), PathBuf::from("/data/outputs/abc_result.mp4"));
    }

    #[test]
    fn test_unsafe_ids_rejected() {
        assert!(is_safe_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_safe_id("../etc"));
        assert!(!is_safe_id(""));
        assert!(!is_safe_id("a/b"));
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let root = TempDir::new().unwrap();
        let layout = WorkspaceLayout::under(root.path());
        layout.ensure_dirs().await.unwrap();
        let id = TaskId::new();

        tokio::fs::create_dir_all(layout.frames_dir(&id)).await.unwrap();
        tokio::fs::write(layout.frames_dir(&id).join("00000.jpg"), b"x").await.unwrap();
        tokio::fs::create_dir_all(layout.results_dir(&id)).await.unwrap();
        tokio::fs::write(layout.output_path(&id), b"video").await.unwrap();

        assert_eq!(layout.cleanup(&id).await.unwrap(), 2);
        assert_eq!(layout.cleanup(&id).await.unwrap(), 0);
        assert!(!layout.frames_dir(&id).exists());
        assert!(layout.output_path(&id).exists());
    }

    #[tokio::test]
    async fn test_find_upload_by_stem() {
        let root = TempDir::new().unwrap();
        let layout = WorkspaceLayout::under(root.path());
        layout.ensure_dirs().await.unwrap();
        tokio::fs::write(layout.upload_path("clip-1", "mov"), b"v").await.unwrap();

        assert_eq!(
            layout.find_upload("clip-1").await.unwrap(),
            Some(layout.upload_dir.join("clip-1.mov"))
        );
        assert_eq!(layout.find_upload("clip-2").await.unwrap(), None);
        assert_eq!(layout.find_upload("../clip-1").await.unwrap(), None);
    }
}
