//! 文件上传
//!
//! 以分块方式把本地文件写入远程路径，按粗粒度百分比上报进度

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};
use crate::infra::ssh::RemoteSession;

/// 文件上传器
#[derive(Clone, Debug)]
pub struct FileTransfer {
    chunk_size: usize,
    chunk_timeout: Duration,
    progress_step: u8,
    cancel: CancellationToken,
}

impl FileTransfer {
    pub fn new(chunk_size: usize, chunk_timeout: Duration, progress_step: u8, cancel: CancellationToken) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_timeout,
            progress_step: progress_step.clamp(1, 100),
            cancel,
        }
    }

    /// 上传本地文件
    ///
    /// 本地文件不存在时在任何网络操作前失败。`on_progress` 收到单调递增的百分比，
    /// 最后一次总是 100。失败后远程文件状态未定义。返回写入的字节数。
    pub async fn upload<F>(
        &self,
        session: &mut dyn RemoteSession,
        local_path: &Path,
        remote_path: &str,
        mut on_progress: F,
    ) -> DeployResult<u64>
    where
        F: FnMut(u8) + Send,
    {
        let metadata = tokio::fs::metadata(local_path).await.map_err(|e| {
            DeployError::Transfer(format!("local file {} is not readable: {}", local_path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(DeployError::Transfer(format!(
                "local path {} is not a regular file",
                local_path.display()
            )));
        }
        let total = metadata.len();

        let mut local = tokio::fs::File::open(local_path).await.map_err(|e| {
            DeployError::Transfer(format!("cannot open {}: {}", local_path.display(), e))
        })?;

        info!(
            local = %local_path.display(),
            remote = %remote_path,
            bytes = total,
            "Starting upload"
        );

        let mut remote = self.bounded("open remote file", session.create_file(remote_path)).await?;
        let mut progress = ProgressTracker::new(total, self.progress_step);
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent: u64 = 0;

        loop {
            let n = local.read(&mut buf).await.map_err(|e| {
                DeployError::Transfer(format!("reading {} failed: {}", local_path.display(), e))
            })?;
            if n == 0 {
                break;
            }

            self.bounded("upload chunk", remote.write_chunk(&buf[..n])).await?;
            sent += n as u64;

            if let Some(percent) = progress.advance(sent) {
                on_progress(percent);
            }
        }

        self.bounded("finish upload", remote.finish()).await?;

        if let Some(percent) = progress.complete() {
            on_progress(percent);
        }

        if sent != total {
            warn!(expected = total, sent, "Local file size changed during upload");
        }
        debug!(remote = %remote_path, bytes = sent, "Upload finished");
        Ok(sent)
    }

    /// 为单个挂起点加上超时与取消
    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = DeployResult<T>>) -> DeployResult<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled),
            result = tokio::time::timeout(self.chunk_timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(DeployError::Timeout {
                    operation: operation.to_string(),
                    secs: self.chunk_timeout.as_secs(),
                }),
            }
        }
    }
}

/// 粗粒度进度计算
///
/// 只在跨过下一个 `step` 百分比时上报，保证单调且最终为 100
#[derive(Debug)]
struct ProgressTracker {
    total: u64,
    step: u8,
    last_reported: Option<u8>,
}

impl ProgressTracker {
    fn new(total: u64, step: u8) -> Self {
        Self {
            total,
            step,
            last_reported: None,
        }
    }

    fn advance(&mut self, sent: u64) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let percent = ((sent.min(self.total) as u128 * 100) / self.total as u128) as u8;
        let due = match self.last_reported {
            None => true,
            Some(last) => percent >= last.saturating_add(self.step) || (percent == 100 && last < 100),
        };
        if due {
            self.last_reported = Some(percent);
            Some(percent)
        } else {
            None
        }
    }

    fn complete(&mut self) -> Option<u8> {
        if self.last_reported == Some(100) {
            None
        } else {
            self.last_reported = Some(100);
            Some(100)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRemote;
    use std::io::Write;

    fn transfer() -> FileTransfer {
        FileTransfer::new(1024, Duration::from_secs(5), 10, CancellationToken::new())
    }

    fn local_file(bytes: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; bytes]).unwrap();
        file
    }

    #[tokio::test]
    async fn test_upload_reports_monotonic_progress() {
        let remote = FakeRemote::new();
        let mut session = remote.session();
        let file = local_file(10 * 1024);

        let mut seen = Vec::new();
        let sent = transfer()
            .upload(&mut session, file.path(), "/opt/app/app.jar", |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(sent, 10 * 1024);
        assert_eq!(remote.uploaded("/opt/app/app.jar").unwrap().len(), 10 * 1024);
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.len() <= 11);
    }

    #[tokio::test]
    async fn test_empty_file_reports_completion() {
        let remote = FakeRemote::new();
        let mut session = remote.session();
        let file = local_file(0);

        let mut seen = Vec::new();
        transfer()
            .upload(&mut session, file.path(), "/tmp/empty.zip", |p| seen.push(p))
            .await
            .unwrap();

        assert_eq!(seen, vec![100]);
        assert_eq!(remote.uploaded("/tmp/empty.zip").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_before_network() {
        let remote = FakeRemote::new();
        let mut session = remote.session();

        let err = transfer()
            .upload(&mut session, Path::new("/nonexistent/app.jar"), "/opt/app/app.jar", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Transfer(_)));
        assert!(remote.uploaded("/opt/app/app.jar").is_none());
        assert_eq!(remote.files_opened(), 0);
    }

    #[tokio::test]
    async fn test_remote_write_failure_is_transfer_error() {
        let remote = FakeRemote::new().fail_upload("connection reset by peer");
        let mut session = remote.session();
        let file = local_file(4096);

        let err = transfer()
            .upload(&mut session, file.path(), "/opt/app/app.jar", |_| {})
            .await
            .unwrap_err();

        match err {
            DeployError::Transfer(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_chunk_times_out() {
        let remote = FakeRemote::new().with_write_delay(Duration::from_secs(600));
        let mut session = remote.session();
        let file = local_file(2048);

        let err = transfer()
            .upload(&mut session, file.path(), "/opt/app/app.jar", |_| {})
            .await
            .unwrap_err();

        match err {
            DeployError::Timeout { operation, secs } => {
                assert_eq!(operation, "upload chunk");
                assert_eq!(secs, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(remote.write_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_upload() {
        let remote = FakeRemote::new().with_write_delay(Duration::from_millis(500));
        let mut session = remote.session();
        let file = local_file(8 * 1024);
        let cancel = CancellationToken::new();
        let transfer = FileTransfer::new(1024, Duration::from_secs(60), 10, cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            canceller.cancel();
        });

        let mut seen = Vec::new();
        let err = transfer
            .upload(&mut session, file.path(), "/opt/app/app.jar", |p| seen.push(p))
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Cancelled));
        assert_eq!(remote.write_times().len(), 2);
        assert!(!seen.contains(&100));
    }

    #[test]
    fn test_progress_tracker_steps() {
        let mut tracker = ProgressTracker::new(1000, 25);
        assert_eq!(tracker.advance(10), Some(1));
        assert_eq!(tracker.advance(100), None);
        assert_eq!(tracker.advance(260), Some(26));
        assert_eq!(tracker.advance(999), Some(99));
        assert_eq!(tracker.advance(1000), Some(100));
        assert_eq!(tracker.complete(), None);
    }
}
