//! 部署目标服务器相关领域模型

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// SSH 凭据
///
/// 私钥与密码可以同时存在，私钥优先
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    /// 私钥内容（PEM/OpenSSH 格式）
    pub private_key: Option<String>,
    /// 私钥口令
    pub passphrase: Option<String>,
    pub password: Option<String>,
}

/// 实际采用的认证方式
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AuthMethod<'a> {
    PrivateKey {
        pem: &'a str,
        passphrase: Option<&'a str>,
    },
    Password(&'a str),
}

impl AuthMethod<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::PrivateKey { .. } => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl Credential {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn private_key(pem: impl Into<String>, passphrase: Option<String>) -> Self {
        Self {
            private_key: Some(pem.into()),
            passphrase,
            ..Default::default()
        }
    }

    /// 选择认证方式：私钥优先，其次密码；空字符串视为缺失
    pub fn auth_method(&self) -> Option<AuthMethod<'_>> {
        if let Some(pem) = self.private_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Some(AuthMethod::PrivateKey {
                pem,
                passphrase: self.passphrase.as_deref().filter(|p| !p.is_empty()),
            });
        }
        self.password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(AuthMethod::Password)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// 部署目标服务器
///
/// 由外部服务器注册表提供，单次部署期间不可变
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerTarget {
    /// 注册表中的服务器 ID
    pub id: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub credential: Credential,
    /// Java 运行时路径
    #[serde(default)]
    pub java_path: Option<String>,
    /// Nginx 可执行文件路径
    #[serde(default)]
    pub nginx_path: Option<String>,
    /// 默认部署目录
    #[serde(default)]
    pub deploy_path: Option<String>,
    /// 默认重启命令
    #[serde(default)]
    pub restart_command: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl ServerTarget {
    /// 创建使用默认端口的目标
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            credential,
            java_path: None,
            nginx_path: None,
            deploy_path: None,
            restart_command: None,
        }
    }

    /// `user@host:port`
    pub fn display_addr(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    /// 校验连接必填字段（凭据在建立会话时检查）
    pub fn validate(&self) -> DeployResult<()> {
        if self.host.trim().is_empty() {
            return Err(DeployError::Validation("server host is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(DeployError::Validation("server username is required".to_string()));
        }
        if self.port == 0 {
            return Err(DeployError::Validation("server port must be non-zero".to_string()));
        }
        Ok(())
    }
}
