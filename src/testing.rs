//! 测试替身
//!
//! 内存中的远程主机：记录命令与上传，按脚本返回结果，模拟存在性探测和备份重命名

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{AuthMethod, ServerTarget};
use crate::error::{DeployError, DeployResult};
use crate::infra::ssh::{CommandOutput, RemoteFile, RemoteSession, SessionConnector};

#[derive(Default)]
struct FakeState {
    files: HashSet<String>,
    dirs: HashSet<String>,
    responses: Vec<(String, String)>,
    failures: Vec<(String, u32, String)>,
    upload_failure: Option<String>,
    connect_delay: Option<Duration>,
    exec_delay: Option<Duration>,
    write_delay: Option<Duration>,
    reject_auth: bool,
    commands: Vec<String>,
    uploads: HashMap<String, Vec<u8>>,
    write_times: Vec<Instant>,
    files_opened: usize,
    connect_attempts: usize,
    auth_methods: Vec<String>,
    closes: usize,
    open_sessions: usize,
}

/// 可脚本化的远程主机
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_file(self, path: &str) -> Self {
        self.lock().files.insert(path.to_string());
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.lock().dirs.insert(path.to_string());
        self
    }

    /// 包含 `pattern` 的命令返回给定 stdout
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.lock().responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// 包含 `pattern` 的命令以给定退出码失败
    pub fn fail_command(self, pattern: &str, exit_code: u32, stderr: &str) -> Self {
        self.lock()
            .failures
            .push((pattern.to_string(), exit_code, stderr.to_string()));
        self
    }

    pub fn fail_upload(self, message: &str) -> Self {
        self.lock().upload_failure = Some(message.to_string());
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    pub fn with_exec_delay(self, delay: Duration) -> Self {
        self.lock().exec_delay = Some(delay);
        self
    }

    /// 每个分块写入前等待 `delay`
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.lock().write_delay = Some(delay);
        self
    }

    pub fn reject_auth(self) -> Self {
        self.lock().reject_auth = true;
        self
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector { remote: self.clone() }
    }

    /// 直接获得一个已打开的会话
    pub fn session(&self) -> FakeSession {
        self.lock().open_sessions += 1;
        FakeSession {
            remote: self.clone(),
            closed: false,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn uploaded(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().uploads.get(path).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        state.files.contains(path) || state.dirs.contains(path)
    }

    /// 每个分块写入完成的时刻
    pub fn write_times(&self) -> Vec<Instant> {
        self.lock().write_times.clone()
    }

    pub fn files_opened(&self) -> usize {
        self.lock().files_opened
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn auth_methods(&self) -> Vec<String> {
        self.lock().auth_methods.clone()
    }

    /// 实际生效的关闭次数
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    fn handle_command(&self, command: &str) -> CommandOutput {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.commands.push(command.to_string());

        if let Some((_, code, stderr)) = state.failures.iter().find(|(p, _, _)| command.contains(p.as_str())) {
            return CommandOutput {
                exit_code: Some(*code),
                stdout: String::new(),
                stderr: stderr.clone(),
            };
        }

        let quoted = quoted_args(command);

        if command.starts_with("if [ -f ") || command.starts_with("if [ -d ") {
            let present = quoted.first().is_some_and(|path| {
                if command.starts_with("if [ -f ") {
                    state.files.contains(path)
                } else {
                    state.dirs.contains(path)
                }
            });
            return ok(if present { "present\n" } else { "absent\n" });
        }

        if command.starts_with("rm -rf ") && command.contains(" && mv ") && quoted.len() == 3 {
            let (backup, original) = (&quoted[0], &quoted[1]);
            for set in [&mut state.files, &mut state.dirs] {
                if set.remove(original) {
                    set.insert(backup.clone());
                }
            }
            return ok("");
        }

        if command.starts_with("mkdir -p ") {
            if let Some(dir) = quoted.first() {
                state.dirs.insert(dir.clone());
            }
        }

        let stdout = state
            .responses
            .iter()
            .find(|(p, _)| command.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        ok(&stdout)
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// 提取命令中单引号包裹的参数（测试路径不含引号）
fn quoted_args(command: &str) -> Vec<String> {
    command
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

pub struct FakeConnector {
    remote: FakeRemote,
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(
        &self,
        _target: &ServerTarget,
        auth: AuthMethod<'_>,
    ) -> DeployResult<Box<dyn RemoteSession>> {
        let (delay, reject) = {
            let mut state = self.remote.lock();
            state.connect_attempts += 1;
            state.auth_methods.push(auth.name().to_string());
            (state.connect_delay, state.reject_auth)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if reject {
            return Err(DeployError::Authentication("server rejected credentials".to_string()));
        }
        Ok(Box::new(self.remote.session()))
    }
}

pub struct FakeSession {
    remote: FakeRemote,
    closed: bool,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&mut self, command: &str) -> DeployResult<CommandOutput> {
        let delay = self.remote.lock().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.remote.handle_command(command))
    }

    async fn create_file(&mut self, remote_path: &str) -> DeployResult<Box<dyn RemoteFile>> {
        let failure = {
            let mut state = self.remote.lock();
            state.files_opened += 1;
            state.uploads.insert(remote_path.to_string(), Vec::new());
            state.upload_failure.clone()
        };
        Ok(Box::new(FakeFile {
            remote: self.remote.clone(),
            path: remote_path.to_string(),
            failure,
        }))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.remote.lock();
            state.closes += 1;
            state.open_sessions -= 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

struct FakeFile {
    remote: FakeRemote,
    path: String,
    failure: Option<String>,
}

#[async_trait]
impl RemoteFile for FakeFile {
    async fn write_chunk(&mut self, chunk: &[u8]) -> DeployResult<()> {
        if let Some(message) = &self.failure {
            return Err(DeployError::Transfer(format!("write to {} failed: {}", self.path, message)));
        }
        let delay = self.remote.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.remote.lock();
        state
            .uploads
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(chunk);
        state.write_times.push(Instant::now());
        Ok(())
    }

    async fn finish(&mut self) -> DeployResult<()> {
        if let Some(message) = &self.failure {
            return Err(DeployError::Transfer(format!("closing {} failed: {}", self.path, message)));
        }
        self.remote.lock().files.insert(self.path.clone());
        Ok(())
    }
}
