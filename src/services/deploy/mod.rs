//! 部署服务模块
//!
//! 部署主入口：校验请求、建立会话、执行对应流程，并保证会话关闭与本地产物删除

pub mod artifact;
pub mod backend;
pub mod context;
pub mod frontend;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::domain::deploy::DeployStage;
use crate::domain::{DeployKind, DeployStatus, DeploymentRequest};
use crate::error::DeployResult;
use crate::infra::command::{shell_quote, CommandRunner};
use crate::infra::ssh::{open_session, RemoteSession, SessionConnector};
use crate::infra::transfer::FileTransfer;
use crate::state::{DeployJob, JobSink, JobStore, LogSink};

pub use artifact::LocalArtifact;
pub use context::DeployContext;

/// 部署成功后的汇总
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub deploy_id: String,
    pub kind: DeployKind,
    pub host: String,
    /// 后端为 JAR 路径，前端为解压目录
    pub remote_path: String,
    /// 本次产生的备份路径
    pub backup: Option<String>,
    pub stages: Vec<DeployStage>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// 单个流程的产出
#[derive(Debug)]
pub struct FlowOutcome {
    pub remote_path: String,
    pub backup: Option<String>,
}

/// 执行一次部署
///
/// 每一步都通过 `sink` 报告；失败时先报告最终错误再返回。
/// 无论结果如何，已建立的会话都会关闭，本地产物都会删除。
pub async fn execute(
    connector: &dyn SessionConnector,
    config: &DeployConfig,
    request: DeploymentRequest,
    sink: &dyn LogSink,
    cancel: CancellationToken,
) -> DeployResult<DeployReport> {
    execute_as(Uuid::new_v4().to_string(), connector, config, request, sink, cancel).await
}

async fn execute_as(
    deploy_id: String,
    connector: &dyn SessionConnector,
    config: &DeployConfig,
    request: DeploymentRequest,
    sink: &dyn LogSink,
    cancel: CancellationToken,
) -> DeployResult<DeployReport> {
    // 守卫最先创建，任何返回路径都会删除本地产物
    let artifact = LocalArtifact::new(&request.local_artifact);
    let started_at = Utc::now();
    let mut ctx = DeployContext::new(deploy_id.clone(), sink, config.sink_timeout, cancel);
    ctx.init_stages(match request.kind {
        DeployKind::Backend => backend::STAGES,
        DeployKind::Frontend => frontend::STAGES,
    });

    info!(
        deploy_id = %deploy_id,
        kind = request.kind.as_str(),
        server_id = %request.target.id,
        host = %request.target.host,
        "Starting deployment"
    );

    let result = run(&mut ctx, connector, config, &request).await;
    artifact.remove().await;

    match result {
        Ok(outcome) => {
            ctx.log(format!("{} deployment completed successfully", capitalize(request.kind.as_str())))
                .await;
            info!(deploy_id = %deploy_id, remote_path = %outcome.remote_path, "Deployment succeeded");
            Ok(DeployReport {
                deploy_id,
                kind: request.kind,
                host: request.target.display_addr(),
                remote_path: outcome.remote_path,
                backup: outcome.backup,
                stages: ctx.stages().to_vec(),
                started_at,
                finished_at: Utc::now(),
            })
        }
        Err(e) => {
            ctx.log_error(format!("Deployment failed: {}", e)).await;
            error!(deploy_id = %deploy_id, kind = e.kind(), error = %e, "Deployment failed");
            Err(e)
        }
    }
}

/// 建立会话并执行流程，流程结束后关闭会话
async fn run(
    ctx: &mut DeployContext<'_>,
    connector: &dyn SessionConnector,
    config: &DeployConfig,
    request: &DeploymentRequest,
) -> DeployResult<FlowOutcome> {
    request.validate()?;

    ctx.start_stage("connect");
    let opened = open_session(connector, &request.target, config.connect_timeout, &ctx.cancel).await;
    ctx.finish_stage("connect", &opened);
    let mut session = opened?;
    ctx.log(format!("Connected to {}", request.target.display_addr())).await;

    let result = match request.kind {
        DeployKind::Backend => backend::execute(ctx, config, request, session.as_mut()).await,
        DeployKind::Frontend => frontend::execute(ctx, config, request, session.as_mut()).await,
    };

    close_session(session.as_mut(), config).await;
    ctx.log("Disconnected from server").await;

    result
}

/// 关闭会话，断开握手受连接超时约束
pub(crate) async fn close_session(session: &mut dyn RemoteSession, config: &DeployConfig) {
    if session.is_closed() {
        return;
    }
    if tokio::time::timeout(config.connect_timeout, session.close()).await.is_err() {
        warn!(
            timeout_secs = config.connect_timeout.as_secs(),
            "SSH session close timed out"
        );
    }
}

/// 确保远程目录存在
pub(crate) async fn ensure_directory(
    ctx: &mut DeployContext<'_>,
    runner: &CommandRunner,
    session: &mut dyn RemoteSession,
    dir: &str,
) -> DeployResult<()> {
    ctx.start_stage("ensure_dir");
    let result = runner.run(session, &format!("mkdir -p {}", shell_quote(dir))).await;
    ctx.finish_stage("ensure_dir", &result);
    result?;
    ctx.log(format!("Target directory ready: {}", dir)).await;
    Ok(())
}

/// 上传并把进度百分比转成进度日志
///
/// 进度经无界通道转交；上传与日志输出并发推进，慢 sink 不会拖慢分块写入
pub(crate) async fn upload_with_progress(
    ctx: &mut DeployContext<'_>,
    config: &DeployConfig,
    session: &mut dyn RemoteSession,
    local_path: &Path,
    remote_path: &str,
) -> DeployResult<u64> {
    let transfer = FileTransfer::new(
        config.chunk_size,
        config.chunk_timeout,
        config.progress_step,
        ctx.cancel.clone(),
    );
    let (tx, mut rx) = mpsc::unbounded_channel::<u8>();

    // 上传结束时回调连同发送端一起释放，drain 随之退出
    let upload = transfer.upload(session, local_path, remote_path, move |percent| {
        let _ = tx.send(percent);
    });
    let drain = async {
        while let Some(percent) = rx.recv().await {
            ctx.log(format!("Uploading: {}%", percent)).await;
        }
    };

    let (result, ()) = tokio::join!(upload, drain);
    result
}

/// 带任务记录的部署
///
/// 创建 pending 任务，进度写入任务日志（并转发给 `forward`），结束时标记 success/error
pub async fn run_tracked(
    store: Arc<JobStore>,
    connector: &dyn SessionConnector,
    config: &DeployConfig,
    request: DeploymentRequest,
    forward: Option<Arc<dyn LogSink>>,
    cancel: CancellationToken,
) -> (String, DeployResult<DeployReport>) {
    let job = DeployJob::new(Uuid::new_v4().to_string(), request.kind, request.target.id.clone());
    let job_id = store.create(job).await;

    let sink = JobSink::new(store.clone(), job_id.clone(), forward);
    let result = execute_as(job_id.clone(), connector, config, request, &sink, cancel).await;

    match &result {
        Ok(_) => store.finish(&job_id, DeployStatus::Success, None).await,
        Err(e) => store.finish(&job_id, DeployStatus::Error, Some(e.to_string())).await,
    }
    (job_id, result)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
