//! SSH 客户端模块
//!
//! `session` 定义会话抽象，`client` 基于 russh / russh-sftp 实现

mod client;
mod session;

pub use client::SshConnector;
pub use session::{open_session, CommandOutput, RemoteFile, RemoteSession, SessionConnector};
