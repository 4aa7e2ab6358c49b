//! 基础设施模块
//!
//! 封装 SSH 会话以及基于会话的远程原语（命令执行、文件传输）

pub mod command;
pub mod ssh;
pub mod transfer;

pub use command::CommandRunner;
pub use ssh::{open_session, RemoteSession, SessionConnector, SshConnector};
pub use transfer::FileTransfer;
