//! 部署前备份
//!
//! 目标路径已存在时重命名为 `<path>.bak.<YYYY-MM-DD>`，同一天的备份会被覆盖

use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::infra::command::{shell_quote, CommandRunner};
use crate::infra::ssh::RemoteSession;

/// 探测到目标存在时命令输出的标记
const PRESENT_MARKER: &str = "present";

/// 备份对象类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupKind {
    /// 单个文件（后端 JAR）
    File,
    /// 目录（前端静态包）
    Directory,
}

impl BackupKind {
    fn test_flag(&self) -> &'static str {
        match self {
            BackupKind::File => "-f",
            BackupKind::Directory => "-d",
        }
    }
}

/// 备份策略
#[derive(Clone, Copy, Debug)]
pub struct BackupPolicy {
    date: NaiveDate,
}

impl BackupPolicy {
    /// 以本地日期命名备份
    pub fn today() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn backup_name(&self, path: &str) -> String {
        format!("{}.bak.{}", path, self.date.format("%Y-%m-%d"))
    }

    /// 目标存在时备份并返回备份路径，不存在时返回 None
    pub async fn maybe_backup(
        &self,
        runner: &CommandRunner,
        session: &mut dyn RemoteSession,
        path: &str,
        kind: BackupKind,
    ) -> DeployResult<Option<String>> {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(DeployError::Validation("refusing to back up the filesystem root".to_string()));
        }

        let probe = format!(
            "if [ {} {} ]; then echo {}; else echo absent; fi",
            kind.test_flag(),
            shell_quote(path),
            PRESENT_MARKER
        );
        let output = runner.run(session, &probe).await?;
        if output.stdout.trim() != PRESENT_MARKER {
            debug!(path = %path, "Nothing to back up");
            return Ok(None);
        }

        let backup = self.backup_name(path);
        // mv 不会覆盖已存在的目录，先删除同一天的旧备份
        let rename = format!(
            "rm -rf {} && mv {} {}",
            shell_quote(&backup),
            shell_quote(path),
            shell_quote(&backup)
        );
        runner.run(session, &rename).await?;

        info!(path = %path, backup = %backup, "Existing deployment backed up");
        Ok(Some(backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRemote;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn policy() -> BackupPolicy {
        BackupPolicy::for_date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
    }

    fn runner() -> CommandRunner {
        CommandRunner::new(Duration::from_secs(5), CancellationToken::new())
    }

    #[test]
    fn test_backup_name_uses_date_only() {
        assert_eq!(policy().backup_name("/opt/app/app.jar"), "/opt/app/app.jar.bak.2024-01-05");
    }

    #[tokio::test]
    async fn test_existing_file_is_renamed() {
        let remote = FakeRemote::new().with_file("/opt/app/app.jar");
        let mut session = remote.session();

        let backup = policy()
            .maybe_backup(&runner(), &mut session, "/opt/app/app.jar", BackupKind::File)
            .await
            .unwrap();

        assert_eq!(backup.as_deref(), Some("/opt/app/app.jar.bak.2024-01-05"));
        assert!(!remote.exists("/opt/app/app.jar"));
        assert!(remote.exists("/opt/app/app.jar.bak.2024-01-05"));
    }

    #[tokio::test]
    async fn test_missing_target_is_left_alone() {
        let remote = FakeRemote::new();
        let mut session = remote.session();

        let backup = policy()
            .maybe_backup(&runner(), &mut session, "/opt/app/app.jar", BackupKind::File)
            .await
            .unwrap();

        assert!(backup.is_none());
        assert_eq!(remote.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_same_day_backup_overwrites() {
        let remote = FakeRemote::new()
            .with_dir("/srv/www/dist")
            .with_dir("/srv/www/dist.bak.2024-01-05");
        let mut session = remote.session();

        let backup = policy()
            .maybe_backup(&runner(), &mut session, "/srv/www/dist/", BackupKind::Directory)
            .await
            .unwrap();

        assert_eq!(backup.as_deref(), Some("/srv/www/dist.bak.2024-01-05"));
        let commands = remote.commands();
        assert_eq!(
            commands[1],
            "rm -rf '/srv/www/dist.bak.2024-01-05' && mv '/srv/www/dist' '/srv/www/dist.bak.2024-01-05'"
        );
        assert!(!remote.exists("/srv/www/dist"));
    }

    #[tokio::test]
    async fn test_file_probe_ignores_directories() {
        let remote = FakeRemote::new().with_dir("/opt/app/app.jar");
        let mut session = remote.session();

        let backup = policy()
            .maybe_backup(&runner(), &mut session, "/opt/app/app.jar", BackupKind::File)
            .await
            .unwrap();
        assert!(backup.is_none());
    }

    #[tokio::test]
    async fn test_root_is_rejected() {
        let remote = FakeRemote::new();
        let mut session = remote.session();

        let err = policy()
            .maybe_backup(&runner(), &mut session, "/", BackupKind::Directory)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
        assert!(remote.commands().is_empty());
    }
}
