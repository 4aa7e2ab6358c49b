//! 运行时状态模块
//!
//! 进度日志输出与部署任务记录

pub mod job_store;
pub mod log_sink;

pub use job_store::{DeployJob, JobSink, JobStore};
pub use log_sink::{BroadcastSink, FnSink, LogSink, MemorySink, TracingSink};
