//! 配置模块
//!
//! 环境变量解析与服务器目标文件加载

pub mod env;
pub mod server;

pub use env::DeployConfig;
pub use server::{load_server_file, ServerRecord};
