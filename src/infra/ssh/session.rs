//! 远程会话抽象
//!
//! 一个会话对应一次部署的独占连接：命令执行 + 文件写入，`close` 幂等

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{AuthMethod, ServerTarget};
use crate::error::{DeployError, DeployResult};

/// 单次远程命令的原始结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandOutput {
    /// 退出码；远程未上报退出状态时为 None
    pub exit_code: Option<u32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// 已认证的远程会话
#[async_trait]
pub trait RemoteSession: Send {
    /// 以单次 shell 调用执行命令，收集 stdout/stderr 直到远程关闭通道
    ///
    /// 非零退出码不视为错误，只有通道级故障才返回 Err
    async fn exec(&mut self, command: &str) -> DeployResult<CommandOutput>;

    /// 在远程路径创建（或截断）文件用于写入
    async fn create_file(&mut self, remote_path: &str) -> DeployResult<Box<dyn RemoteFile>>;

    /// 关闭会话，可重复调用
    async fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// 正在写入的远程文件
#[async_trait]
pub trait RemoteFile: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> DeployResult<()>;

    /// 刷新并关闭远程文件
    async fn finish(&mut self) -> DeployResult<()>;
}

/// 会话建立器
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// 建立连接并用给定方式认证
    async fn connect(
        &self,
        target: &ServerTarget,
        auth: AuthMethod<'_>,
    ) -> DeployResult<Box<dyn RemoteSession>>;
}

/// 打开会话
///
/// 认证方式在任何网络操作之前确定；连接就绪受 `timeout` 约束，超时视为连接错误
pub async fn open_session(
    connector: &dyn SessionConnector,
    target: &ServerTarget,
    timeout: Duration,
    cancel: &CancellationToken,
) -> DeployResult<Box<dyn RemoteSession>> {
    target.validate()?;

    let auth = target.credential.auth_method().ok_or_else(|| {
        DeployError::Authentication(format!(
            "no password or private key configured for server {}",
            target.id
        ))
    })?;

    info!(
        server_id = %target.id,
        addr = %target.display_addr(),
        method = auth.name(),
        "Opening SSH session"
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(server_id = %target.id, "SSH connect cancelled");
            Err(DeployError::Cancelled)
        }
        result = tokio::time::timeout(timeout, connector.connect(target, auth)) => match result {
            Ok(session) => session,
            Err(_) => {
                warn!(server_id = %target.id, timeout_secs = timeout.as_secs(), "SSH connect timed out");
                Err(DeployError::Connection(format!(
                    "timed out after {}s waiting for {} to become ready",
                    timeout.as_secs(),
                    target.display_addr()
                )))
            }
        }
    }
}
