//! russh 客户端实现

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use russh_sftp::client::fs::File;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::session::{CommandOutput, RemoteFile, RemoteSession, SessionConnector};
use crate::config::env::constants::KEEPALIVE_INTERVAL_SECS;
use crate::domain::{AuthMethod, ServerTarget};
use crate::error::{DeployError, DeployResult};

/// SSH stderr 扩展数据类型
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// 基于 russh 的会话建立器
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new() -> Self {
        let config = client::Config {
            keepalive_interval: Some(Duration::from_secs(KEEPALIVE_INTERVAL_SECS)),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(
        &self,
        target: &ServerTarget,
        auth: AuthMethod<'_>,
    ) -> DeployResult<Box<dyn RemoteSession>> {
        // 先解析私钥，格式错误时不必建立连接
        let login = match auth {
            AuthMethod::PrivateKey { pem, passphrase } => Login::Key(Arc::new(
                russh_keys::decode_secret_key(pem, passphrase)
                    .map_err(|e| DeployError::Authentication(format!("invalid private key: {e}")))?,
            )),
            AuthMethod::Password(password) => Login::Password(password),
        };

        let handler = ClientHandler {
            host: target.host.clone(),
        };
        let mut handle = client::connect(self.config.clone(), (target.host.as_str(), target.port), handler)
            .await
            .map_err(|e| DeployError::Connection(format!("{}: {}", target.display_addr(), e)))?;

        let accepted = match login {
            Login::Key(key_pair) => {
                handle
                    .authenticate_publickey(target.username.clone(), key_pair)
                    .await
            }
            Login::Password(password) => {
                handle
                    .authenticate_password(target.username.clone(), password)
                    .await
            }
        }
        .map_err(|e| DeployError::Connection(format!("authentication exchange failed: {e}")))?;

        if !accepted {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(DeployError::Authentication(format!(
                "server rejected {} credentials for {}",
                auth.name(),
                target.display_addr()
            )));
        }

        info!(addr = %target.display_addr(), "SSH session established");
        Ok(Box::new(SshSession {
            handle: Some(handle),
            addr: target.display_addr(),
        }))
    }
}

/// 预先准备好的登录凭据
enum Login<'a> {
    Key(Arc<key::KeyPair>),
    Password(&'a str),
}

/// 客户端回调处理器
struct ClientHandler {
    host: String,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: 校验注册表中记录的主机指纹（目前接受任意主机密钥）
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting SSH host key"
        );
        Ok(true)
    }
}

/// 已认证的 russh 会话
pub struct SshSession {
    handle: Option<Handle<ClientHandler>>,
    addr: String,
}

impl SshSession {
    fn handle(&self) -> DeployResult<&Handle<ClientHandler>> {
        self.handle
            .as_ref()
            .ok_or_else(|| DeployError::Connection(format!("session to {} is already closed", self.addr)))
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> DeployResult<CommandOutput> {
        let channel_error = |e: russh::Error| DeployError::command(command, None, format!("channel error: {e}"));

        let mut channel = self.handle()?.channel_open_session().await.map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        // 通道关闭前持续收集，退出状态可能先于剩余输出到达
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!(addr = %self.addr, signal = ?signal_name, "Remote command terminated by signal");
                }
                _ => {}
            }
        }

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn create_file(&mut self, remote_path: &str) -> DeployResult<Box<dyn RemoteFile>> {
        let transfer_error = |stage: &str, e: String| DeployError::Transfer(format!("{stage}: {e}"));

        let channel = self
            .handle()?
            .channel_open_session()
            .await
            .map_err(|e| transfer_error("SFTP channel open failed", e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| transfer_error("SFTP subsystem request failed", e.to_string()))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| transfer_error("SFTP init failed", e.to_string()))?;
        let file = sftp
            .create(remote_path)
            .await
            .map_err(|e| transfer_error(&format!("cannot create {remote_path}"), e.to_string()))?;

        Ok(Box::new(SftpFile {
            sftp,
            file,
            path: remote_path.to_string(),
        }))
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "deployment finished", "en")
                .await
            {
                warn!(addr = %self.addr, error = %e, "SSH disconnect failed");
            }
            info!(addr = %self.addr, "SSH session closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.handle.is_none()
    }
}

/// 通过 SFTP 子系统写入的远程文件
struct SftpFile {
    sftp: SftpSession,
    file: File,
    path: String,
}

#[async_trait]
impl RemoteFile for SftpFile {
    async fn write_chunk(&mut self, chunk: &[u8]) -> DeployResult<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| DeployError::Transfer(format!("write to {} failed: {}", self.path, e)))
    }

    async fn finish(&mut self) -> DeployResult<()> {
        self.file
            .shutdown()
            .await
            .map_err(|e| DeployError::Transfer(format!("closing {} failed: {}", self.path, e)))?;
        if let Err(e) = self.sftp.close().await {
            debug!(path = %self.path, error = %e, "SFTP session close failed");
        }
        Ok(())
    }
}
