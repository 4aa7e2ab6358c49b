//! 部署上下文
//!
//! 一次部署的执行上下文：部署 ID、进度输出、阶段记录与取消令牌

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::deploy::{DeployStage, StageStatus};
use crate::domain::ProgressEvent;
use crate::error::DeployResult;
use crate::state::LogSink;

/// 部署执行上下文
///
/// 每次部署独占一个，不在部署之间共享
pub struct DeployContext<'a> {
    /// 部署 ID
    pub deploy_id: String,
    /// 进度输出
    sink: &'a dyn LogSink,
    /// 单次 sink 调用时限
    sink_timeout: Duration,
    /// 已发出的事件序号
    seq: u64,
    /// 阶段记录
    stages: Vec<DeployStage>,
    /// 取消令牌
    pub cancel: CancellationToken,
}

impl<'a> DeployContext<'a> {
    pub fn new(deploy_id: String, sink: &'a dyn LogSink, sink_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deploy_id,
            sink,
            sink_timeout,
            seq: 0,
            stages: Vec::new(),
            cancel,
        }
    }

    /// 发送进度日志
    pub async fn log(&mut self, message: impl Into<String>) {
        self.emit(message.into(), false).await;
    }

    /// 发送错误日志
    pub async fn log_error(&mut self, message: impl Into<String>) {
        self.emit(message.into(), true).await;
    }

    /// 交付一条事件；sink 出错、超时或 panic 只记录告警
    async fn emit(&mut self, message: String, is_error: bool) {
        self.seq += 1;
        let event = ProgressEvent::new(self.seq, message, is_error);

        let delivery = AssertUnwindSafe(self.sink.emit(&event)).catch_unwind();
        match tokio::time::timeout(self.sink_timeout, delivery).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                warn!(deploy_id = %self.deploy_id, seq = event.seq, error = %e, "Log sink failed");
            }
            Ok(Err(_)) => {
                warn!(deploy_id = %self.deploy_id, seq = event.seq, "Log sink panicked");
            }
            Err(_) => {
                warn!(
                    deploy_id = %self.deploy_id,
                    seq = event.seq,
                    timeout_ms = self.sink_timeout.as_millis() as u64,
                    "Log sink timed out"
                );
            }
        }
    }

    /// 声明本次部署的阶段
    pub fn init_stages(&mut self, stages: &[(&str, &str)]) {
        self.stages = stages
            .iter()
            .map(|(name, display_name)| DeployStage::new(name, display_name))
            .collect();
    }

    /// 开始阶段
    pub fn start_stage(&mut self, name: &str) {
        if let Some(stage) = self.stage_mut(name) {
            stage.start();
        }
        info!(deploy_id = %self.deploy_id, stage = name, "Stage started");
    }

    /// 按结果结束阶段
    pub fn finish_stage<T>(&mut self, name: &str, result: &DeployResult<T>) {
        let (success, message) = match result {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        if let Some(stage) = self.stage_mut(name) {
            stage.finish(success, message);
        }
        if success {
            info!(deploy_id = %self.deploy_id, stage = name, "Stage finished");
        } else {
            warn!(deploy_id = %self.deploy_id, stage = name, "Stage failed");
        }
    }

    pub fn skip_stage(&mut self, name: &str, reason: &str) {
        if let Some(stage) = self.stage_mut(name) {
            stage.skip(Some(reason.to_string()));
        }
    }

    fn stage_mut(&mut self, name: &str) -> Option<&mut DeployStage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// 未执行到的阶段保持 pending
    pub fn stages(&self) -> &[DeployStage] {
        &self.stages
    }

    pub fn stage_status(&self, name: &str) -> Option<&StageStatus> {
        self.stages.iter().find(|s| s.name == name).map(|s| &s.status)
    }
}
