//! 部署任务存储
//!
//! 每次部署对应一条任务记录：创建时为 pending，进度逐行追加，结束时转为 success/error 并移入历史

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::env::constants::MAX_JOB_HISTORY;
use crate::domain::{DeployKind, DeployStatus, ProgressEvent};
use crate::state::log_sink::LogSink;

/// 部署任务记录
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployJob {
    pub id: String,
    pub kind: DeployKind,
    pub server_id: String,
    pub status: DeployStatus,
    /// 带时间戳的进度行
    pub log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DeployJob {
    pub fn new(id: String, kind: DeployKind, server_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            server_id,
            status: DeployStatus::Pending,
            log: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }
}

/// 任务存储
pub struct JobStore {
    /// 进行中的任务
    jobs: RwLock<HashMap<String, DeployJob>>,
    /// 已结束的任务，最新在前
    history: RwLock<VecDeque<DeployJob>>,
    max_history: usize,
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_history_limit(MAX_JOB_HISTORY)
    }

    pub fn with_history_limit(max_history: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// 创建 pending 任务
    pub async fn create(&self, job: DeployJob) -> String {
        let id = job.id.clone();
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    /// 追加一行带本地时间戳的日志
    pub async fn append_log(&self, job_id: &str, message: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(job_id) {
            job.log
                .push(format!("{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message));
            job.updated_at = Utc::now();
        }
    }

    /// 结束任务并移入历史，非终态被忽略
    pub async fn finish(&self, job_id: &str, status: DeployStatus, error: Option<String>) {
        if !status.is_terminal() {
            warn!(job_id, status = status.as_str(), "Ignoring non-terminal job status");
            return;
        }
        let job = {
            let mut jobs = self.jobs.write().await;
            jobs.remove(job_id).map(|mut job| {
                let now = Utc::now();
                job.status = status;
                job.error = error;
                job.updated_at = now;
                job.completed_at = Some(now);
                job
            })
        };

        if let Some(job) = job {
            let mut history = self.history.write().await;
            history.push_front(job);
            while history.len() > self.max_history {
                history.pop_back();
            }
        }
    }

    /// 获取任务（先查进行中，再查历史）
    pub async fn get(&self, job_id: &str) -> Option<DeployJob> {
        if let Some(job) = self.jobs.read().await.get(job_id) {
            return Some(job.clone());
        }
        let history = self.history.read().await;
        history.iter().find(|j| j.id == job_id).cloned()
    }

    /// 获取历史记录
    pub async fn get_history(&self, limit: usize, server_id: Option<&str>, status: Option<&str>) -> Vec<DeployJob> {
        let history = self.history.read().await;
        history
            .iter()
            .filter(|job| {
                let server_match = server_id.map_or(true, |s| job.server_id == s);
                let status_match = status.map_or(true, |s| job.status.as_str() == s);
                server_match && status_match
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn history_count(&self) -> usize {
        self.history.read().await.len()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 把进度写入任务记录，并可转发给另一个 sink
pub struct JobSink {
    store: Arc<JobStore>,
    job_id: String,
    forward: Option<Arc<dyn LogSink>>,
}

impl JobSink {
    pub fn new(store: Arc<JobStore>, job_id: String, forward: Option<Arc<dyn LogSink>>) -> Self {
        Self { store, job_id, forward }
    }
}

#[async_trait]
impl LogSink for JobSink {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.store.append_log(&self.job_id, &event.to_string()).await;
        if let Some(forward) = &self.forward {
            forward.emit(event).await?;
        }
        Ok(())
    }
}
