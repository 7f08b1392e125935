//! SSH 客户端实现
//!
//! 基于 russh 的 [`Connector`] / [`Transport`] 默认实现：
//! - 密码或私钥认证
//! - exec 通道执行命令，分离 stdout/stderr 并采集退出码
//! - 通过 `mkdir -p && cat >` 通道流式上传文件，目录递归上传

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tracing::{debug, info, warn};

use super::transport::{Connector, ExecOutput, Transport};
use crate::domain::host::{Credential, Host};
use crate::error::SessionError;

/// russh 客户端回调
struct ClientHandler {
    endpoint: String,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        // 接受所有主机密钥，只记录指纹
        debug!(
            endpoint = %self.endpoint,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting SSH host key"
        );
        Ok(true)
    }
}

/// SSH 连接器
pub struct SshConnector {
    connect_timeout: Duration,
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            config: Arc::new(client::Config::default()),
        }
    }

    async fn connect_and_authenticate(&self, host: &Host) -> Result<SshTransport, SessionError> {
        let endpoint = host.endpoint();
        let handler = ClientHandler {
            endpoint: endpoint.clone(),
        };

        let mut handle = client::connect(
            self.config.clone(),
            (host.address.as_str(), host.port),
            handler,
        )
        .await
        .map_err(|e| SessionError::Connect(e.to_string()))?;

        let authenticated = match &host.credential {
            Credential::Password(password) => handle
                .authenticate_password(host.username.as_str(), password.as_str())
                .await
                .map_err(|e| SessionError::Connect(e.to_string()))?,
            Credential::PrivateKey { path, passphrase } => {
                let key = russh_keys::load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                    SessionError::Connect(format!("failed to load key {}: {}", path.display(), e))
                })?;
                handle
                    .authenticate_publickey(host.username.as_str(), Arc::new(key))
                    .await
                    .map_err(|e| SessionError::Connect(e.to_string()))?
            }
        };

        if !authenticated {
            warn!(endpoint = %endpoint, user = %host.username, "SSH authentication rejected");
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(SessionError::AuthRejected(host.username.clone()));
        }

        info!(endpoint = %endpoint, user = %host.username, "SSH session established");
        Ok(SshTransport { endpoint, handle })
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Transport>, SessionError> {
        match tokio::time::timeout(self.connect_timeout, self.connect_and_authenticate(host)).await {
            Ok(result) => {
                let transport: Box<dyn Transport> = Box::new(result?);
                Ok(transport)
            }
            Err(_) => Err(SessionError::ConnectTimeout(self.connect_timeout.as_secs())),
        }
    }
}

/// 已认证的 SSH 连接
pub struct SshTransport {
    endpoint: String,
    handle: Handle<ClientHandler>,
}

impl SshTransport {
    async fn make_remote_dir(&mut self, dir: &str) -> Result<(), SessionError> {
        let (output, _) = self
            .run_channel(&format!("mkdir -p {}", shell_quote(dir)), None)
            .await?;
        if output.exit_code != 0 {
            return Err(SessionError::upload_failed(format!(
                "mkdir {}: {}",
                dir,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    /// 上传单个文件
    async fn upload_one(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, SessionError> {
        let file = tokio::fs::File::open(local_path).await.map_err(|e| {
            SessionError::upload_failed(format!("open {}: {}", local_path.display(), e))
        })?;

        let command = upload_command(remote_path);
        debug!(endpoint = %self.endpoint, command = %command, "Upload request");

        let (output, bytes) = self
            .run_channel(&command, Some(file))
            .await
            .map_err(|e| match e {
                SessionError::Channel(reason) => SessionError::upload_failed(reason),
                other => other,
            })?;

        if output.exit_code != 0 {
            let reason = output.stderr.trim();
            return Err(SessionError::upload_failed(if reason.is_empty() {
                format!("remote write exited with status {}", output.exit_code)
            } else {
                reason.to_string()
            }));
        }

        Ok(bytes)
    }

    /// 在新通道上执行命令，可选地先写入 stdin
    async fn run_channel(
        &mut self,
        command: &str,
        stdin: Option<tokio::fs::File>,
    ) -> Result<(ExecOutput, u64), SessionError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut sent = 0;
        if let Some(file) = stdin {
            sent = file.metadata().await.map(|m| m.len()).unwrap_or(0);
            channel.data(file).await?;
            channel.eof().await?;
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        // ExitStatus 之后可能还有数据，读到通道关闭为止
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!(endpoint = %self.endpoint, signal = ?signal_name, "Remote process killed by signal");
                    exit_code.get_or_insert(-1);
                }
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or_else(|| {
            SessionError::Channel("remote process exited without a status".to_string())
        })?;

        Ok((
            ExecOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            },
            sent,
        ))
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
        debug!(endpoint = %self.endpoint, command = %command, "Exec request");
        let (output, _) = self.run_channel(command, None).await?;
        Ok(output)
    }

    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, SessionError> {
        let steps = plan_upload(local_path, remote_path).await?;
        let total = steps.len();
        let mut bytes = 0;
        let mut failures = Vec::new();

        // 单个条目失败不中断目录上传，结束后汇总
        for step in steps {
            let result = match &step {
                UploadStep::Dir(dir) => self.make_remote_dir(dir).await.map(|_| 0),
                UploadStep::File { local, remote } => self.upload_one(local, remote).await,
            };
            match result {
                Ok(sent) => bytes += sent,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, step = ?step, error = %e, "Upload step failed");
                    failures.push(e);
                }
            }
        }

        match failures.len() {
            0 => Ok(bytes),
            1 if total == 1 => Err(failures.remove(0)),
            n => Err(SessionError::upload_failed(format!(
                "{} of {} entries failed, first error: {}",
                n, total, failures[0]
            ))),
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        debug!(endpoint = %self.endpoint, "SSH session closed");
        Ok(())
    }
}

/// 远程路径统一使用 `/` 分隔
pub fn to_unix_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut cleaned = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && cleaned.ends_with('/') {
            continue;
        }
        cleaned.push(c);
    }
    if cleaned.len() > 1 && cleaned.ends_with('/') {
        cleaned.pop();
    }
    cleaned
}

/// 单引号转义，用于拼接远程 shell 命令
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// 上传计划中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
enum UploadStep {
    /// 创建远程目录
    Dir(String),
    File { local: PathBuf, remote: String },
}

/// 展开上传源：文件为一步，目录按层级展开为先建目录、再传文件
///
/// 条目按名称排序，符号链接按其目标处理
async fn plan_upload(local_path: &Path, remote_path: &str) -> Result<Vec<UploadStep>, SessionError> {
    let remote_root = to_unix_path(remote_path);
    let meta = tokio::fs::metadata(local_path)
        .await
        .map_err(|e| read_error(local_path, e))?;
    if !meta.is_dir() {
        return Ok(vec![UploadStep::File {
            local: local_path.to_path_buf(),
            remote: remote_root,
        }]);
    }

    let mut steps = Vec::new();
    let mut pending = vec![(local_path.to_path_buf(), remote_root)];

    while let Some((dir, remote_dir)) = pending.pop() {
        steps.push(UploadStep::Dir(remote_dir.clone()));

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(|e| read_error(&dir, e))?;
        while let Some(entry) = reader.next_entry().await.map_err(|e| read_error(&dir, e))? {
            entries.push(entry.path());
        }
        entries.sort();

        let mut subdirs = Vec::new();
        for path in entries {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let remote = if remote_dir.ends_with('/') {
                format!("{}{}", remote_dir, name)
            } else {
                format!("{}/{}", remote_dir, name)
            };
            let meta = tokio::fs::metadata(&path).await.map_err(|e| read_error(&path, e))?;
            if meta.is_dir() {
                subdirs.push((path, remote));
            } else {
                steps.push(UploadStep::File { local: path, remote });
            }
        }
        // 逆序入栈，按名称顺序处理子目录
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(steps)
}

fn read_error(path: &Path, e: std::io::Error) -> SessionError {
    SessionError::upload_failed(format!("{}: {}", path.display(), e))
}

/// 先确保远程目录存在，再把 stdin 写入目标文件
fn upload_command(remote_path: &str) -> String {
    let remote_path = to_unix_path(remote_path);
    match remote_path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() && dir != "." => format!(
            "mkdir -p {} && cat > {}",
            shell_quote(dir),
            shell_quote(&remote_path)
        ),
        _ => format!("cat > {}", shell_quote(&remote_path)),
    }
}
