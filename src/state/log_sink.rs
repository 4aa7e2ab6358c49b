//! 进度日志输出
//!
//! 部署流程把每个进度事件按顺序交给 `LogSink`；sink 的失败不会中断部署

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use crate::domain::ProgressEvent;

/// 广播通道容量
const LOG_CHANNEL_CAPACITY: usize = 256;

/// 进度事件接收方
#[async_trait]
pub trait LogSink: Send + Sync {
    /// 接收一条进度事件，调用顺序即事件顺序
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()>;
}

/// 闭包适配器，接收格式化后的单行文本
pub struct FnSink<F> {
    f: F,
}

impl<F> FnSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> LogSink for FnSink<F>
where
    F: Fn(&str) + Send + Sync,
{
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        (self.f)(&event.to_string());
        Ok(())
    }
}

/// 广播适配器
///
/// 没有订阅者时事件直接丢弃
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSink for BroadcastSink {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// 写入 tracing 的适配器
#[derive(Clone, Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl LogSink for TracingSink {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        if event.is_error {
            error!(seq = event.seq, "{}", event.message);
        } else {
            info!(seq = event.seq, "{}", event.message);
        }
        Ok(())
    }
}

/// 内存收集器
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().await.clone()
    }

    /// 按顺序返回格式化后的消息
    pub async fn messages(&self) -> Vec<String> {
        self.events.lock().await.iter().map(ToString::to_string).collect()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn emit(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
