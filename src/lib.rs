//! XJP SSH Deploy - 远程产物部署引擎
//!
//! 通过 SSH 将后端 JAR 或前端静态包推送到远程主机，替换旧部署并激活

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DeployConfig;
pub use domain::{Credential, DeployKind, DeploymentRequest, ProgressEvent, ServerTarget};
pub use error::{DeployError, DeployResult};
pub use infra::ssh::SshConnector;
pub use services::deploy::{execute, run_tracked, DeployReport};
pub use services::probe::{probe_server, ProbeReport};
pub use state::{JobStore, LogSink};
