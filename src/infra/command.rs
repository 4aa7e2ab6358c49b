//! 远程命令执行器
//!
//! 在已有会话上执行 shell 命令：
//! - 超时控制
//! - 取消支持
//! - 非零退出码统一转换为 `DeployError::CommandExecution`

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{DeployError, DeployResult};
use crate::infra::ssh::{CommandOutput, RemoteSession};

/// 日志中展示的命令最大长度
const COMMAND_LOG_CHARS: usize = 120;

/// 远程命令执行器
///
/// 除超时与取消令牌外不持有状态，每次调用相互独立
#[derive(Clone, Debug)]
pub struct CommandRunner {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CommandRunner {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// 执行远程命令
    ///
    /// 退出码为 0 时返回输出；否则返回携带退出码与完整 stderr 的错误
    pub async fn run(&self, session: &mut dyn RemoteSession, command: &str) -> DeployResult<CommandOutput> {
        debug!(command = %truncate_output(command, COMMAND_LOG_CHARS), "Executing remote command");

        let output = tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!("Remote command cancelled");
                return Err(DeployError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, session.exec(command)) => match result {
                Ok(output) => output?,
                Err(_) => {
                    error!(timeout_secs = self.timeout.as_secs(), "Remote command timed out");
                    return Err(DeployError::Timeout {
                        operation: format!("command `{}`", truncate_output(command, COMMAND_LOG_CHARS)),
                        secs: self.timeout.as_secs(),
                    });
                }
            }
        };

        if output.success() {
            Ok(output)
        } else {
            warn!(
                exit_code = ?output.exit_code,
                stderr = %truncate_output(&output.stderr, COMMAND_LOG_CHARS),
                "Remote command failed"
            );
            Err(DeployError::CommandExecution {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}

/// 为 shell 命令引用参数
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// 按字符截断文本，超出部分以 `...` 表示
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
