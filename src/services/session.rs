//! 远程会话
//!
//! 一次运行内与单台主机绑定的连接，状态机：
//! `Connecting → Ready ⇄ Busy → Closed`，连接失败时为 `Failed`。
//! 关闭是幂等的；未显式关闭就被丢弃时，在后台任务里释放连接。

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::host::Host;
use crate::error::SessionError;
use crate::infra::transport::{Connector, Transport};

/// 会话状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Busy,
    Closed,
    Failed,
}

/// 命令执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// 上传结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes: u64,
    pub duration: Duration,
}

/// 会话选项
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionOptions {
    /// 单条命令/上传超时
    pub command_timeout: Option<Duration>,
}

/// 远程会话
pub struct RemoteSession {
    host: String,
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
    options: SessionOptions,
}

impl RemoteSession {
    /// 建立会话：`Connecting → Ready`，失败则为 `Failed` 并返回错误
    pub async fn open(
        connector: &Arc<dyn Connector>,
        host: &Host,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            host: host.label().to_string(),
            state: SessionState::Connecting,
            transport: None,
            options,
        };

        match connector.connect(host).await {
            Ok(transport) => {
                session.transport = Some(transport);
                session.state = SessionState::Ready;
                Ok(session)
            }
            Err(e) => {
                session.state = SessionState::Failed;
                tracing::warn!(host = %session.host, error = %e, "Failed to open session");
                Err(e)
            }
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 执行命令直到远程进程退出
    ///
    /// 非零退出码是正常结果，由调用方解释
    pub async fn run_command(&mut self, line: &str) -> Result<CommandOutput, SessionError> {
        let timeout = self.options.command_timeout;
        let started = Instant::now();
        let transport = self.begin()?;

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, transport.exec(line)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout(limit.as_secs())),
            },
            None => transport.exec(line).await,
        };
        self.state = SessionState::Ready;

        let output = result?;
        Ok(CommandOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            duration: started.elapsed(),
        })
    }

    /// 上传本地文件，失败统一为 `UploadFailed`
    pub async fn upload_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<UploadReport, SessionError> {
        let timeout = self.options.command_timeout;
        let started = Instant::now();
        let transport = self.begin()?;

        let result = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, transport.upload(local_path, remote_path)).await {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::Timeout(limit.as_secs())),
                }
            }
            None => transport.upload(local_path, remote_path).await,
        };
        self.state = SessionState::Ready;

        let bytes = result.map_err(|e| match e {
            SessionError::UploadFailed { .. } | SessionError::Closed => e,
            other => SessionError::upload_failed(other.to_string()),
        })?;

        tracing::info!(
            host = %self.host,
            local = %local_path.display(),
            remote = %remote_path,
            bytes = bytes,
            "File uploaded"
        );

        Ok(UploadReport {
            bytes,
            duration: started.elapsed(),
        })
    }

    /// 关闭会话，可重复调用；关闭错误只记录日志
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::warn!(host = %self.host, error = %e, "Error while closing session");
            }
        }
        self.state = SessionState::Closed;
    }

    /// `Ready → Busy`
    fn begin(&mut self) -> Result<&mut Box<dyn Transport>, SessionError> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Busy => {
                return Err(SessionError::Channel("session is busy".to_string()))
            }
            _ => return Err(SessionError::Closed),
        }
        let transport = self.transport.as_mut().ok_or(SessionError::Closed)?;
        self.state = SessionState::Busy;
        Ok(transport)
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        let host = self.host.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = transport.close().await;
                    tracing::debug!(host = %host, "Session released after drop");
                });
            }
            Err(_) => {
                tracing::warn!(host = %host, "Session dropped outside of a runtime");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::transport::ExecOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        closes: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
            tokio::time::sleep(self.delay).await;
            let exit_code = if command.starts_with("false") { 1 } else { 0 };
            Ok(ExecOutput {
                exit_code,
                stdout: format!("{}\n", command),
                stderr: String::new(),
            })
        }

        async fn upload(&mut self, _local: &Path, remote: &str) -> Result<u64, SessionError> {
            if remote.starts_with("/root") {
                return Err(SessionError::Channel("permission denied".to_string()));
            }
            Ok(42)
        }

        async fn close(&mut self) -> Result<(), SessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeConnector {
        closes: Arc<AtomicUsize>,
        delay: Duration,
        refuse: bool,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, host: &Host) -> Result<Box<dyn Transport>, SessionError> {
            if self.refuse {
                return Err(SessionError::AuthRejected(host.username.clone()));
            }
            Ok(Box::new(FakeTransport {
                closes: self.closes.clone(),
                delay: self.delay,
            }))
        }
    }

    fn connector(delay: Duration, refuse: bool) -> (Arc<dyn Connector>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let connector: Arc<dyn Connector> = Arc::new(FakeConnector {
            closes: closes.clone(),
            delay,
            refuse,
        });
        (connector, closes)
    }

    fn host() -> Host {
        Host::with_password("10.0.0.1", 22, "ops", "x")
    }

    #[tokio::test]
    async fn test_run_command_and_close_twice() {
        let (connector, closes) = connector(Duration::ZERO, false);
        let mut session = RemoteSession::open(&connector, &host(), SessionOptions::default())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let output = session.run_command("echo ok").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "echo ok\n");

        let output = session.run_command("false").await.unwrap();
        assert_eq!(output.exit_code, 1);
        assert_eq!(session.state(), SessionState::Ready);

        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let err = session.run_command("echo again").await.unwrap_err();
        assert_eq!(err, SessionError::Closed);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let (connector, _) = connector(Duration::ZERO, true);
        let err = RemoteSession::open(&connector, &host(), SessionOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err, SessionError::AuthRejected("ops".to_string()));
    }

    #[tokio::test]
    async fn test_upload_errors_become_upload_failed() {
        let (connector, _) = connector(Duration::ZERO, false);
        let mut session = RemoteSession::open(&connector, &host(), SessionOptions::default())
            .await
            .unwrap();

        let report = session
            .upload_file(Path::new("/tmp/a"), "/opt/a")
            .await
            .unwrap();
        assert_eq!(report.bytes, 42);

        let err = session
            .upload_file(Path::new("/tmp/a"), "/root/a")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UploadFailed { .. }));
        assert_eq!(session.state(), SessionState::Ready);
        session.close().await;
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let (connector, _) = connector(Duration::from_secs(5), false);
        let options = SessionOptions {
            command_timeout: Some(Duration::from_millis(20)),
        };
        let mut session = RemoteSession::open(&connector, &host(), options).await.unwrap();

        let err = session.run_command("sleep 5").await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert_eq!(session.state(), SessionState::Ready);
        session.close().await;
    }

    #[tokio::test]
    async fn test_drop_releases_transport() {
        let (connector, closes) = connector(Duration::ZERO, false);
        let session = RemoteSession::open(&connector, &host(), SessionOptions::default())
            .await
            .unwrap();
        drop(session);

        for _ in 0..50 {
            if closes.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("transport was not closed after drop");
    }
}
