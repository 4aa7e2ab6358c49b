//! 统一错误处理
//!
//! 部署流程中的所有失败都归入 `DeployError`，调用方据此映射任务状态

use thiserror::Error;

use crate::infra::command::truncate_output;

/// stderr 在错误信息中展示的最大字符数（完整内容保存在错误本身）
const STDERR_DISPLAY_CHARS: usize = 500;

/// 部署错误类型
#[derive(Debug, Error)]
pub enum DeployError {
    /// 请求缺少必填字段，不会触达网络
    #[error("Invalid deployment request: {0}")]
    Validation(String),

    /// 无可用凭据，或服务器拒绝了凭据
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// 传输层连接失败或超时
    #[error("SSH connection error: {0}")]
    Connection(String),

    /// 远程命令非零退出（或通道级错误）
    #[error(
        "Command failed (exit code: {}): {}",
        exit_code_label(.exit_code),
        truncate_output(.stderr, STDERR_DISPLAY_CHARS)
    )]
    CommandExecution {
        command: String,
        exit_code: Option<u32>,
        stderr: String,
    },

    /// 本地文件缺失或远程写入失败
    #[error("File transfer failed: {0}")]
    Transfer(String),

    /// 远程操作超过时限
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// 部署被调用方取消
    #[error("Deployment cancelled")]
    Cancelled,
}

impl DeployError {
    /// 创建命令执行错误
    pub fn command(command: impl Into<String>, exit_code: Option<u32>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// 错误类别标识，用于日志和任务记录
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Validation(_) => "validation",
            DeployError::Authentication(_) => "authentication",
            DeployError::Connection(_) => "connection",
            DeployError::CommandExecution { .. } => "command_execution",
            DeployError::Transfer(_) => "transfer",
            DeployError::Timeout { .. } => "timeout",
            DeployError::Cancelled => "cancelled",
        }
    }

    /// 远程命令的退出码（如有）
    pub fn exit_code(&self) -> Option<u32> {
        match self {
            DeployError::CommandExecution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

fn exit_code_label(code: &Option<u32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// 便捷类型别名
pub type DeployResult<T> = Result<T, DeployError>;
