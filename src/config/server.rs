//! 服务器目标配置
//!
//! 服务器记录由外部注册表维护，这里只负责把 JSON 记录转换为 `ServerTarget`

use serde::Deserialize;
use std::path::Path;

use crate::domain::{Credential, ServerTarget};
use crate::error::{DeployError, DeployResult};

/// 服务器记录（来自服务器注册表导出的 JSON）
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// 注册表中的服务器 ID
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// 显示名称
    #[serde(default)]
    pub name: Option<String>,
    /// 主机地址
    #[serde(alias = "host")]
    pub ip: String,
    /// SSH 端口
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// 私钥内容（PEM/OpenSSH 格式）
    #[serde(default)]
    pub private_key: Option<String>,
    /// 私钥口令
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub java_path: Option<String>,
    #[serde(default)]
    pub nginx_path: Option<String>,
    /// 默认部署目录
    #[serde(default)]
    pub deploy_path: Option<String>,
    /// 默认重启命令
    #[serde(default)]
    pub restart_script: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl ServerRecord {
    /// 转换为部署目标
    pub fn to_target(&self) -> DeployResult<ServerTarget> {
        let id = match &self.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => self.name.clone().unwrap_or_else(|| self.ip.clone()),
        };

        let credential = Credential {
            private_key: non_empty(&self.private_key),
            passphrase: non_empty(&self.passphrase),
            password: non_empty(&self.password),
        };

        let target = ServerTarget {
            id,
            host: self.ip.trim().to_string(),
            port: self.port,
            username: self.username.trim().to_string(),
            credential,
            java_path: non_empty(&self.java_path),
            nginx_path: non_empty(&self.nginx_path),
            deploy_path: non_empty(&self.deploy_path),
            restart_command: non_empty(&self.restart_script),
        };
        target.validate()?;
        Ok(target)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 从 JSON 文件加载服务器目标
pub async fn load_server_file(path: &Path) -> anyhow::Result<ServerTarget> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read server file {}: {}", path.display(), e)
    })?;
    let record: ServerRecord = serde_json::from_str(&raw)?;
    record
        .to_target()
        .map_err(|e: DeployError| anyhow::anyhow!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_to_target() {
        let record: ServerRecord = serde_json::from_str(
            r#"{
                "id": 7,
                "name": "prod-1",
                "ip": "10.0.0.5",
                "username": "deploy",
                "password": "secret",
                "privateKey": "",
                "javaPath": "/usr/lib/jvm/bin/java",
                "deployPath": "/opt/app"
            }"#,
        )
        .unwrap();

        let target = record.to_target().unwrap();
        assert_eq!(target.id, "7");
        assert_eq!(target.port, 22);
        assert_eq!(target.credential.password.as_deref(), Some("secret"));
        assert!(target.credential.private_key.is_none());
        assert_eq!(target.java_path.as_deref(), Some("/usr/lib/jvm/bin/java"));
        assert_eq!(target.deploy_path.as_deref(), Some("/opt/app"));
    }

    #[test]
    fn test_record_requires_host() {
        let record: ServerRecord =
            serde_json::from_str(r#"{"ip": " ", "username": "deploy", "password": "x"}"#).unwrap();
        assert!(matches!(record.to_target(), Err(DeployError::Validation(_))));
    }

    #[tokio::test]
    async fn test_load_server_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        tokio::fs::write(&path, r#"{"host": "example.com", "port": 2222, "username": "ops", "password": "pw"}"#)
            .await
            .unwrap();

        let target = load_server_file(&path).await.unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 2222);
        assert_eq!(target.id, "example.com");
    }
}
