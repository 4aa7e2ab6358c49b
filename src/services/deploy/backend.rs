//! 后端 JAR 部署
//!
//! 准备目录 → 备份旧 JAR → 上传 → 重启（指定命令或默认后台启动）

use crate::config::env::constants::OUTPUT_PREVIEW_CHARS;
use crate::config::DeployConfig;
use crate::domain::deploy::join_remote;
use crate::domain::DeploymentRequest;
use crate::error::DeployResult;
use crate::infra::command::{shell_quote, truncate_output, CommandRunner};
use crate::infra::ssh::RemoteSession;
use crate::services::backup::{BackupKind, BackupPolicy};

use super::context::DeployContext;
use super::{ensure_directory, upload_with_progress, FlowOutcome};

/// 后端部署阶段
pub const STAGES: &[(&str, &str)] = &[
    ("connect", "Connect"),
    ("ensure_dir", "Prepare Directory"),
    ("backup", "Backup"),
    ("upload", "Upload Artifact"),
    ("activate", "Activate"),
];

/// 在已打开的会话上执行后端部署
pub async fn execute(
    ctx: &mut DeployContext<'_>,
    config: &DeployConfig,
    request: &DeploymentRequest,
    session: &mut dyn RemoteSession,
) -> DeployResult<FlowOutcome> {
    let runner = CommandRunner::new(config.command_timeout, ctx.cancel.clone());
    let dir = request.resolved_remote_dir()?;
    let name = request.resolved_file_name()?;
    let remote_path = join_remote(&dir, &name);

    ensure_directory(ctx, &runner, session, &dir).await?;

    // Backup
    ctx.start_stage("backup");
    let backup = BackupPolicy::today()
        .maybe_backup(&runner, session, &remote_path, BackupKind::File)
        .await;
    ctx.finish_stage("backup", &backup);
    let backup = backup?;
    match &backup {
        Some(path) => ctx.log(format!("Backed up existing {} to {}", name, path)).await,
        None => ctx.log(format!("No existing {} found, skipping backup", name)).await,
    }

    // Upload
    ctx.start_stage("upload");
    ctx.log(format!("Uploading {} to {}", name, remote_path)).await;
    let uploaded = upload_with_progress(ctx, config, session, &request.local_artifact, &remote_path).await;
    ctx.finish_stage("upload", &uploaded);
    let bytes = uploaded?;
    ctx.log(format!("Uploaded {} ({} bytes) to {}", name, bytes, remote_path)).await;

    // Activate
    ctx.start_stage("activate");
    let command = match request.effective_restart_command() {
        Some(command) => {
            ctx.log(format!("Running restart command: {}", command)).await;
            command.to_string()
        }
        None => {
            let java = request.target.java_path.as_deref().unwrap_or(&config.java_path);
            ctx.log(format!("Launching {} with {}", name, java)).await;
            default_launch_command(java, &dir, &name, &config.app_log)
        }
    };
    let activated = runner.run(session, &command).await;
    ctx.finish_stage("activate", &activated);
    let output = activated?;
    ctx.log("Activation command finished").await;

    let stdout = output.stdout.trim();
    if !stdout.is_empty() {
        ctx.log(format!("Output: {}", truncate_output(stdout, OUTPUT_PREVIEW_CHARS))).await;
    }

    Ok(FlowOutcome {
        remote_path,
        backup,
    })
}

/// 默认启动命令：在目标目录后台启动 JAR，输出写入日志文件，脱离 SSH 会话
///
/// `java` 不加引号，允许携带 JVM 参数
pub fn default_launch_command(java: &str, dir: &str, name: &str, app_log: &str) -> String {
    format!(
        "cd {} && (nohup {} -jar {} > {} 2>&1 < /dev/null &)",
        shell_quote(dir),
        java,
        shell_quote(name),
        shell_quote(&join_remote(dir, app_log))
    )
}
