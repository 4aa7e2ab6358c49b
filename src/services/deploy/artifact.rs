//! 本地产物清理
//!
//! 部署结束后无论成功与否都删除本地产物

use std::path::PathBuf;
use tracing::{debug, warn};

/// 本地产物守卫
///
/// 正常路径调用 `remove`；守卫被提前丢弃（panic 或 future 被取消）时同步删除
pub struct LocalArtifact {
    path: PathBuf,
    removed: bool,
}

impl LocalArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    /// 删除本地产物，文件已不存在不算错误
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Local artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove local artifact"),
        }
    }
}

impl Drop for LocalArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove local artifact");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.jar");
        std::fs::write(&path, b"jar").unwrap();

        LocalArtifact::new(&path).remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        LocalArtifact::new(dir.path().join("gone.zip")).remove().await;
    }

    #[test]
    fn test_drop_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dist.zip");
        std::fs::write(&path, b"zip").unwrap();

        drop(LocalArtifact::new(&path));
        assert!(!path.exists());
    }
}
