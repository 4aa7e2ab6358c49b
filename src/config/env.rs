//! 环境变量配置加载

use std::env;
use std::time::Duration;
use tracing::warn;

use self::constants::*;

/// 部署引擎配置
///
/// 所有远程挂起点（连接、命令、上传分块）都受这里的时限约束
#[derive(Clone, Debug)]
pub struct DeployConfig {
    /// SSH 连接就绪超时
    pub connect_timeout: Duration,
    /// 单条远程命令超时
    pub command_timeout: Duration,
    /// 单个上传分块超时
    pub chunk_timeout: Duration,
    /// 上传分块大小（字节）
    pub chunk_size: usize,
    /// 上传进度上报粒度（百分比）
    pub progress_step: u8,
    /// 前端包上传的远程临时目录
    pub scratch_dir: String,
    /// 默认 Java 运行时路径
    pub java_path: String,
    /// 默认 Web 服务器重载命令
    pub reload_command: String,
    /// 前端包在目标目录中的子目录名
    pub frontend_bundle_dir: String,
    /// 后端默认启动命令的日志文件名
    pub app_log: String,
    /// 单次日志 sink 调用的时限
    pub sink_timeout: Duration,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
            chunk_timeout: Duration::from_secs(CHUNK_TIMEOUT_SECS),
            chunk_size: CHUNK_SIZE,
            progress_step: PROGRESS_STEP,
            scratch_dir: DEFAULT_SCRATCH_DIR.to_string(),
            java_path: DEFAULT_JAVA_PATH.to_string(),
            reload_command: DEFAULT_RELOAD_COMMAND.to_string(),
            frontend_bundle_dir: DEFAULT_BUNDLE_DIR.to_string(),
            app_log: DEFAULT_APP_LOG.to_string(),
            sink_timeout: Duration::from_millis(SINK_TIMEOUT_MS),
        }
    }
}

impl DeployConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let connect_timeout = Duration::from_secs(parse_var("DEPLOY_CONNECT_TIMEOUT_SECS", CONNECT_TIMEOUT_SECS));
        let command_timeout = Duration::from_secs(parse_var("DEPLOY_COMMAND_TIMEOUT_SECS", COMMAND_TIMEOUT_SECS));
        let chunk_timeout = Duration::from_secs(parse_var("DEPLOY_CHUNK_TIMEOUT_SECS", CHUNK_TIMEOUT_SECS));

        let chunk_size = match parse_var("DEPLOY_CHUNK_SIZE", CHUNK_SIZE) {
            0 => {
                warn!("DEPLOY_CHUNK_SIZE must be positive, using default");
                CHUNK_SIZE
            }
            size => size,
        };

        let progress_step = match parse_var("DEPLOY_PROGRESS_STEP", PROGRESS_STEP) {
            step @ 1..=100 => step,
            _ => {
                warn!("DEPLOY_PROGRESS_STEP must be within 1..=100, using default");
                PROGRESS_STEP
            }
        };

        let scratch_dir = string_var("DEPLOY_SCRATCH_DIR", DEFAULT_SCRATCH_DIR);
        let java_path = string_var("DEPLOY_JAVA_PATH", DEFAULT_JAVA_PATH);
        let reload_command = string_var("DEPLOY_RELOAD_COMMAND", DEFAULT_RELOAD_COMMAND);
        let frontend_bundle_dir = string_var("DEPLOY_FRONTEND_BUNDLE_DIR", DEFAULT_BUNDLE_DIR);
        let app_log = string_var("DEPLOY_APP_LOG", DEFAULT_APP_LOG);

        let sink_timeout = Duration::from_millis(parse_var("DEPLOY_SINK_TIMEOUT_MS", SINK_TIMEOUT_MS));

        Self {
            connect_timeout,
            command_timeout,
            chunk_timeout,
            chunk_size,
            progress_step,
            scratch_dir,
            java_path,
            reload_command,
            frontend_bundle_dir,
            app_log,
            sink_timeout,
        }
    }
}

/// 解析数值型环境变量，缺失或非法时使用默认值
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 读取字符串环境变量，空值视为未设置
fn string_var(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// 常量
pub mod constants {
    /// 连接就绪超时（秒）
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;

    /// 远程命令超时（秒）
    pub const COMMAND_TIMEOUT_SECS: u64 = 300; // 5 分钟

    /// 上传分块超时（秒）
    pub const CHUNK_TIMEOUT_SECS: u64 = 60;

    /// 上传分块大小
    pub const CHUNK_SIZE: usize = 32 * 1024;

    /// 上传进度粒度（百分比）
    pub const PROGRESS_STEP: u8 = 10;

    /// 日志 sink 调用时限（毫秒）
    pub const SINK_TIMEOUT_MS: u64 = 2000;

    /// SSH keepalive 间隔（秒）
    pub const KEEPALIVE_INTERVAL_SECS: u64 = 15;

    pub const DEFAULT_SCRATCH_DIR: &str = "/tmp";
    pub const DEFAULT_JAVA_PATH: &str = "java";
    pub const DEFAULT_RELOAD_COMMAND: &str = "nginx -s reload";
    pub const DEFAULT_BUNDLE_DIR: &str = "dist";
    pub const DEFAULT_APP_LOG: &str = "app.log";

    /// 激活命令输出在进度日志中的预览长度
    pub const OUTPUT_PREVIEW_CHARS: usize = 200;

    /// 任务历史最大保存数量
    pub const MAX_JOB_HISTORY: usize = 100;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_fallback() {
        env::set_var("XJP_TEST_PARSE_OK", "42");
        env::set_var("XJP_TEST_PARSE_BAD", "forty-two");

        assert_eq!(parse_var("XJP_TEST_PARSE_OK", 7u64), 42);
        assert_eq!(parse_var("XJP_TEST_PARSE_BAD", 7u64), 7);
        assert_eq!(parse_var("XJP_TEST_PARSE_MISSING", 7u64), 7);

        env::remove_var("XJP_TEST_PARSE_OK");
        env::remove_var("XJP_TEST_PARSE_BAD");
    }

    #[test]
    fn test_string_var_ignores_blank() {
        env::set_var("XJP_TEST_STRING_BLANK", "   ");
        assert_eq!(string_var("XJP_TEST_STRING_BLANK", "java"), "java");
        env::remove_var("XJP_TEST_STRING_BLANK");
    }

    #[test]
    fn test_defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.scratch_dir, "/tmp");
        assert_eq!(config.reload_command, "nginx -s reload");
        assert_eq!(config.progress_step, 10);
    }
}
