//! 服务器连接测试
//!
//! 建立会话、执行一条探测命令后断开，进度输出与部署一致

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::domain::ServerTarget;
use crate::error::{DeployError, DeployResult};
use crate::infra::command::{truncate_output, CommandRunner};
use crate::infra::ssh::{open_session, SessionConnector};
use crate::services::deploy::{close_session, DeployContext};
use crate::state::LogSink;

const PROBE_COMMAND: &str = "echo ok";
const PROBE_REPLY: &str = "ok";

/// 连接测试结果
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub server_id: String,
    pub host: String,
    /// 从开始连接到探测命令返回的耗时
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

/// 测试服务器是否可连接、可认证、可执行命令
pub async fn probe_server(
    connector: &dyn SessionConnector,
    config: &DeployConfig,
    target: &ServerTarget,
    sink: &dyn LogSink,
    cancel: CancellationToken,
) -> DeployResult<ProbeReport> {
    let mut ctx = DeployContext::new(Uuid::new_v4().to_string(), sink, config.sink_timeout, cancel);
    let started = Instant::now();

    let result = probe_once(&mut ctx, connector, config, target, started).await;

    match result {
        Ok(latency_ms) => {
            ctx.log("Connection test succeeded").await;
            info!(server_id = %target.id, latency_ms, "Connection test succeeded");
            Ok(ProbeReport {
                server_id: target.id.clone(),
                host: target.display_addr(),
                latency_ms,
                checked_at: Utc::now(),
            })
        }
        Err(e) => {
            ctx.log_error(format!("Connection test failed: {}", e)).await;
            warn!(server_id = %target.id, error = %e, "Connection test failed");
            Err(e)
        }
    }
}

/// 连接、探测、断开，返回耗时
async fn probe_once(
    ctx: &mut DeployContext<'_>,
    connector: &dyn SessionConnector,
    config: &DeployConfig,
    target: &ServerTarget,
    started: Instant,
) -> DeployResult<u64> {
    let mut session = open_session(connector, target, config.connect_timeout, &ctx.cancel).await?;
    ctx.log(format!("Connected to {}", target.display_addr())).await;

    let runner = CommandRunner::new(config.command_timeout, ctx.cancel.clone());
    let output = runner.run(session.as_mut(), PROBE_COMMAND).await;
    close_session(session.as_mut(), config).await;
    ctx.log("Disconnected from server").await;

    let output = output?;
    if output.stdout.trim() != PROBE_REPLY {
        return Err(DeployError::command(
            PROBE_COMMAND,
            output.exit_code,
            format!("unexpected reply: {}", truncate_output(output.stdout.trim(), 80)),
        ));
    }
    Ok(started.elapsed().as_millis() as u64)
}
