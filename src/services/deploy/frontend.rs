//! 前端静态包部署
//!
//! 上传 zip 到临时目录 → 备份旧包目录 → 解压覆盖 → 删除临时包 → 按需重载 Web 服务器

use crate::config::DeployConfig;
use crate::domain::deploy::join_remote;
use crate::domain::DeploymentRequest;
use crate::error::DeployResult;
use crate::infra::command::{shell_quote, CommandRunner};
use crate::infra::ssh::RemoteSession;
use crate::services::backup::{BackupKind, BackupPolicy};

use super::context::DeployContext;
use super::{ensure_directory, upload_with_progress, FlowOutcome};

/// 前端部署阶段
pub const STAGES: &[(&str, &str)] = &[
    ("connect", "Connect"),
    ("ensure_dir", "Prepare Directory"),
    ("upload", "Upload Bundle"),
    ("backup", "Backup"),
    ("extract", "Extract Bundle"),
    ("cleanup", "Remove Archive"),
    ("reload", "Reload Web Server"),
];

/// 在已打开的会话上执行前端部署
pub async fn execute(
    ctx: &mut DeployContext<'_>,
    config: &DeployConfig,
    request: &DeploymentRequest,
    session: &mut dyn RemoteSession,
) -> DeployResult<FlowOutcome> {
    let runner = CommandRunner::new(config.command_timeout, ctx.cancel.clone());
    let dir = request.resolved_remote_dir()?;
    let name = request.resolved_file_name()?;
    // 临时包名带部署 ID，并发部署互不覆盖
    let archive = join_remote(&config.scratch_dir, &format!("{}-{}", ctx.deploy_id, name));
    let bundle_dir = join_remote(&dir, &config.frontend_bundle_dir);

    ensure_directory(ctx, &runner, session, &dir).await?;

    // Upload
    ctx.start_stage("upload");
    ctx.log(format!("Uploading {} to {}", name, archive)).await;
    let scratch = runner
        .run(session, &format!("mkdir -p {}", shell_quote(&config.scratch_dir)))
        .await;
    let uploaded = match scratch {
        Ok(_) => upload_with_progress(ctx, config, session, &request.local_artifact, &archive).await,
        Err(e) => Err(e),
    };
    ctx.finish_stage("upload", &uploaded);
    let bytes = uploaded?;
    ctx.log(format!("Uploaded {} ({} bytes) to {}", name, bytes, archive)).await;

    // Backup
    ctx.start_stage("backup");
    let backup = BackupPolicy::today()
        .maybe_backup(&runner, session, &bundle_dir, BackupKind::Directory)
        .await;
    ctx.finish_stage("backup", &backup);
    let backup = backup?;
    match &backup {
        Some(path) => ctx.log(format!("Backed up existing {} to {}", bundle_dir, path)).await,
        None => ctx.log(format!("No existing {} found, skipping backup", bundle_dir)).await,
    }

    // Extract
    ctx.start_stage("extract");
    ctx.log(format!("Extracting {} into {}", name, dir)).await;
    let extracted = runner
        .run(session, &format!("unzip -o {} -d {}", shell_quote(&archive), shell_quote(&dir)))
        .await;
    ctx.finish_stage("extract", &extracted);
    extracted?;
    ctx.log("Extraction finished").await;

    // Cleanup
    ctx.start_stage("cleanup");
    let cleaned = runner.run(session, &format!("rm -f {}", shell_quote(&archive))).await;
    ctx.finish_stage("cleanup", &cleaned);
    cleaned?;
    ctx.log(format!("Removed temporary archive {}", archive)).await;

    // Reload
    if request.reload {
        let command = reload_command(request, config);
        ctx.start_stage("reload");
        ctx.log(format!("Running {}", command)).await;
        let reloaded = runner.run(session, &command).await;
        ctx.finish_stage("reload", &reloaded);
        reloaded?;
        ctx.log("Web server reloaded").await;
    } else {
        ctx.skip_stage("reload", "not requested");
    }

    Ok(FlowOutcome {
        remote_path: dir,
        backup,
    })
}

/// 重载命令：请求指定 > 服务器 nginx 路径 > 全局默认
pub fn reload_command(request: &DeploymentRequest, config: &DeployConfig) -> String {
    if let Some(command) = request.reload_command.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return command.to_string();
    }
    match request.target.nginx_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(nginx) => format!("{} -s reload", nginx),
        None => config.reload_command.clone(),
    }
}
