//! 领域模型模块
//!
//! 纯数据结构，不依赖 SSH 传输

pub mod deploy;
pub mod server;

pub use deploy::{
    DeployKind, DeployStage, DeployStatus, DeploymentRequest, ProgressEvent, StageStatus,
};
pub use server::{AuthMethod, Credential, ServerTarget};
