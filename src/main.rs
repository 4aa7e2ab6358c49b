//! XJP SSH Deploy - 远程产物部署工具
//!
//! Usage:
//! - Backend: `xjp-ssh-deploy backend --server server.json --artifact app.jar --dir /opt/app`
//! - Frontend: `xjp-ssh-deploy frontend --server server.json --artifact dist.zip --dir /srv/www --reload`
//! - Connection test: `xjp-ssh-deploy test-connection --server server.json`

use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use xjp_ssh_deploy::config::env::constants::VERSION;
use xjp_ssh_deploy::config::load_server_file;
use xjp_ssh_deploy::state::FnSink;
use xjp_ssh_deploy::{
    probe_server, run_tracked, DeployConfig, DeployKind, DeploymentRequest, JobStore, LogSink, SshConnector,
};

/// 子命令
#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    Deploy(DeployKind),
    TestConnection,
}

/// 命令行参数
#[derive(Debug, Default)]
struct CliArgs {
    command: Option<Command>,
    server: Option<PathBuf>,
    artifact: Option<PathBuf>,
    dir: Option<String>,
    restart: Option<String>,
    name: Option<String>,
    reload: bool,
    reload_command: Option<String>,
}

/// 解析命令行参数
fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "backend" => {
                cli.command = Some(Command::Deploy(DeployKind::Backend));
                i += 1;
            }
            "frontend" => {
                cli.command = Some(Command::Deploy(DeployKind::Frontend));
                i += 1;
            }
            "test-connection" => {
                cli.command = Some(Command::TestConnection);
                i += 1;
            }
            "--server" if value.is_some() => {
                cli.server = value.map(PathBuf::from);
                i += 2;
            }
            "--artifact" if value.is_some() => {
                cli.artifact = value.map(PathBuf::from);
                i += 2;
            }
            "--dir" if value.is_some() => {
                cli.dir = value;
                i += 2;
            }
            "--restart" if value.is_some() => {
                cli.restart = value;
                i += 2;
            }
            "--name" if value.is_some() => {
                cli.name = value;
                i += 2;
            }
            "--reload-command" if value.is_some() => {
                cli.reload_command = value;
                i += 2;
            }
            "--reload" => {
                cli.reload = true;
                i += 1;
            }
            "--version" | "-V" => {
                println!("xjp-ssh-deploy {}", VERSION);
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
                i += 1;
            }
        }
    }

    cli
}

fn print_help() {
    println!("XJP SSH Deploy - 远程产物部署工具");
    println!();
    println!("USAGE:");
    println!("    xjp-ssh-deploy <COMMAND> --server <FILE> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    backend            Deploy a JAR and restart the service");
    println!("    frontend           Deploy a zipped static bundle");
    println!("    test-connection    Connect, run a probe command and disconnect");
    println!();
    println!("OPTIONS:");
    println!("    --server <FILE>            Server record (JSON)");
    println!("    --artifact <PATH>          Local JAR or zip to deploy");
    println!("    --dir <DIR>                Remote target directory (defaults to the server's deployPath)");
    println!("    --restart <CMD>            Backend restart command, run verbatim");
    println!("    --name <NAME>              Remote file name override");
    println!("    --reload                   Reload the web server after a frontend deploy");
    println!("    --reload-command <CMD>     Reload command override");
    println!("    -V, --version              Print version");
    println!("    -h, --help                 Print help information");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG, DEPLOY_CONNECT_TIMEOUT_SECS, DEPLOY_COMMAND_TIMEOUT_SECS,");
    println!("    DEPLOY_CHUNK_TIMEOUT_SECS, DEPLOY_SCRATCH_DIR, DEPLOY_JAVA_PATH, DEPLOY_RELOAD_COMMAND");
}

fn main() {
    let cli = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(async {
        match run(cli).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                1
            }
        }
    });
    std::process::exit(code);
}

async fn run(cli: CliArgs) -> anyhow::Result<()> {
    let command = cli
        .command
        .ok_or_else(|| anyhow!("missing command, see --help"))?;
    let server_file = cli
        .server
        .as_deref()
        .ok_or_else(|| anyhow!("--server <FILE> is required"))?;

    let target = load_server_file(server_file).await?;
    let config = DeployConfig::from_env();
    let connector = SshConnector::new();
    let printer: Arc<dyn LogSink> = Arc::new(FnSink::new(|line: &str| println!("{}", line)));

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling");
            watcher.cancel();
        }
    });

    match command {
        Command::TestConnection => {
            let report = probe_server(&connector, &config, &target, printer.as_ref(), cancel).await?;
            info!(latency_ms = report.latency_ms, "Server reachable");
        }
        Command::Deploy(kind) => {
            let artifact = cli
                .artifact
                .as_deref()
                .ok_or_else(|| anyhow!("--artifact <PATH> is required"))?;

            // 部署结束后产物会被删除，先复制一份，保留用户的原文件
            let staging = tempfile::tempdir().context("failed to create staging directory")?;
            let staged = stage_artifact(artifact, staging.path()).await?;

            let mut request = DeploymentRequest::new(kind, target, staged, cli.dir).with_reload(cli.reload);
            if let Some(command) = cli.restart {
                request = request.with_restart_command(command);
            }
            if let Some(command) = cli.reload_command {
                request = request.with_reload_command(command);
            }
            if let Some(name) = cli.name {
                request = request.with_remote_file_name(name);
            }

            let store = Arc::new(JobStore::new());
            let (job_id, result) = run_tracked(store, &connector, &config, request, Some(printer), cancel).await;
            let report = result.with_context(|| format!("deployment {} failed", job_id))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// 把产物复制到临时目录，保留原文件名
async fn stage_artifact(artifact: &Path, staging_dir: &Path) -> anyhow::Result<PathBuf> {
    let file_name = artifact
        .file_name()
        .ok_or_else(|| anyhow!("artifact path has no file name: {}", artifact.display()))?;
    let staged = staging_dir.join(file_name);
    tokio::fs::copy(artifact, &staged)
        .await
        .with_context(|| format!("failed to read artifact {}", artifact.display()))?;
    Ok(staged)
}
