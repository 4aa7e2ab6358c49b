//! 部署相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::server::ServerTarget;
use crate::error::{DeployError, DeployResult};

/// 部署类型
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployKind {
    /// 后端 JAR
    Backend,
    /// 前端静态包（zip）
    Frontend,
}

impl DeployKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployKind::Backend => "backend",
            DeployKind::Frontend => "frontend",
        }
    }
}

/// 部署请求
///
/// 每次调用创建一次，本引擎不做持久化
#[derive(Clone, Debug)]
pub struct DeploymentRequest {
    pub kind: DeployKind,
    pub target: ServerTarget,
    /// 本地产物路径（部署结束后总会被删除）
    pub local_artifact: PathBuf,
    /// 远程目标目录，缺省时使用服务器的默认部署目录
    pub remote_dir: Option<String>,
    /// 后端重启命令，原样执行
    pub restart_command: Option<String>,
    /// 前端部署后是否重载 Web 服务器
    pub reload: bool,
    /// 前端重载命令
    pub reload_command: Option<String>,
    /// 远程文件名覆盖
    pub remote_file_name: Option<String>,
}

impl DeploymentRequest {
    /// 创建后端部署请求
    pub fn backend(target: ServerTarget, local_artifact: impl Into<PathBuf>, remote_dir: impl Into<String>) -> Self {
        Self::new(DeployKind::Backend, target, local_artifact.into(), Some(remote_dir.into()))
    }

    /// 创建前端部署请求
    pub fn frontend(target: ServerTarget, local_artifact: impl Into<PathBuf>, remote_dir: impl Into<String>) -> Self {
        Self::new(DeployKind::Frontend, target, local_artifact.into(), Some(remote_dir.into()))
    }

    pub fn new(kind: DeployKind, target: ServerTarget, local_artifact: PathBuf, remote_dir: Option<String>) -> Self {
        Self {
            kind,
            target,
            local_artifact,
            remote_dir,
            restart_command: None,
            reload: false,
            reload_command: None,
            remote_file_name: None,
        }
    }

    pub fn with_restart_command(mut self, command: impl Into<String>) -> Self {
        self.restart_command = Some(command.into());
        self
    }

    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_reload_command(mut self, command: impl Into<String>) -> Self {
        self.reload_command = Some(command.into());
        self
    }

    pub fn with_remote_file_name(mut self, name: impl Into<String>) -> Self {
        self.remote_file_name = Some(name.into());
        self
    }

    /// 解析远程目标目录（去掉末尾的 `/`，根目录除外）
    pub fn resolved_remote_dir(&self) -> DeployResult<String> {
        let dir = self
            .remote_dir
            .as_deref()
            .or(self.target.deploy_path.as_deref())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| DeployError::Validation("remote target directory is required".to_string()))?;

        let trimmed = dir.trim_end_matches('/');
        Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
    }

    /// 解析远程文件名：优先使用覆盖名，否则取本地文件名
    pub fn resolved_file_name(&self) -> DeployResult<String> {
        if let Some(name) = self.remote_file_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if name.contains('/') || name == "." || name == ".." {
                return Err(DeployError::Validation(format!("invalid remote file name: {name}")));
            }
            return Ok(name.to_string());
        }

        self.local_artifact
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                DeployError::Validation(format!(
                    "local artifact path has no file name: {}",
                    self.local_artifact.display()
                ))
            })
    }

    /// 后端实际执行的重启命令（请求优先，其次服务器默认）
    pub fn effective_restart_command(&self) -> Option<&str> {
        self.restart_command
            .as_deref()
            .or(self.target.restart_command.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// 校验请求，不触达网络
    pub fn validate(&self) -> DeployResult<()> {
        self.target.validate()?;
        self.resolved_remote_dir()?;
        self.resolved_file_name()?;
        Ok(())
    }
}

/// 拼接远程路径
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// 部署任务状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Pending,
    Success,
    Error,
}

impl DeployStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Pending => "pending",
            DeployStatus::Success => "success",
            DeployStatus::Error => "error",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Success | DeployStatus::Error)
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// 部署阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployStage {
    /// 阶段标识 (e.g., "connect", "upload", "activate")
    pub name: String,
    /// 显示名称 (e.g., "Connect", "Upload Artifact")
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl DeployStage {
    /// 创建新的待执行阶段
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }
}

/// 进度事件
///
/// 按序号排序的可读消息，可标记为错误
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ProgressEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub is_error: bool,
}

impl ProgressEvent {
    pub fn new(seq: u64, message: impl Into<String>, is_error: bool) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            message: message.into(),
            is_error,
        }
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_error {
            write!(f, "ERROR: {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}
