//! 内存中的远程 shell，记录每次调用

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::{Connector, ExecOutput, Transport};
use crate::domain::host::Host;
use crate::error::SessionError;

/// 调用记录，格式为 `"<op> <address> <arg>"`
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// 可编排的连接器
///
/// - `unreachable` 中的地址连接失败
/// - `echo <text>` 输出 `<text>\n`
/// - 命令 `fail` 以状态 3 退出，`hang` 永不返回
/// - `delays` 为指定地址的每条命令和关闭增加延迟
/// - `upload_failures` 中的地址上传失败，`exec_errors` 中的 (地址, 命令) 返回通道错误
#[derive(Clone, Default)]
pub struct RecordingConnector {
    pub log: CallLog,
    pub unreachable: HashSet<String>,
    pub delays: HashMap<String, Duration>,
    pub upload_failures: HashSet<String>,
    pub exec_errors: HashSet<(String, String)>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    pub fn delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn upload_fails(mut self, address: &str) -> Self {
        self.upload_failures.insert(address.to_string());
        self
    }

    pub fn exec_error(mut self, address: &str, command: &str) -> Self {
        self.exec_errors
            .insert((address.to_string(), command.to_string()));
        self
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Transport>, SessionError> {
        self.log.push(format!("connect {}", host.address));
        if self.unreachable.contains(&host.address) {
            return Err(SessionError::Connect("connection refused".to_string()));
        }
        let failing_commands = self
            .exec_errors
            .iter()
            .filter(|(address, _)| address == &host.address)
            .map(|(_, command)| command.clone())
            .collect();
        Ok(Box::new(RecordingTransport {
            address: host.address.clone(),
            log: self.log.clone(),
            delay: self.delays.get(&host.address).copied().unwrap_or_default(),
            upload_fails: self.upload_failures.contains(&host.address),
            failing_commands,
        }))
    }
}

struct RecordingTransport {
    address: String,
    log: CallLog,
    delay: Duration,
    upload_fails: bool,
    failing_commands: HashSet<String>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
        self.log.push(format!("exec {} {}", self.address, command));
        if command == "hang" {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
        self.log.push(format!("done {} {}", self.address, command));

        if self.failing_commands.contains(command) {
            return Err(SessionError::Channel("broken pipe".to_string()));
        }
        if command == "fail" {
            return Ok(ExecOutput {
                exit_code: 3,
                stdout: String::new(),
                stderr: "boom\n".to_string(),
            });
        }
        let stdout = match command.strip_prefix("echo ") {
            Some(text) => format!("{}\n", text),
            None => format!("{} on {}\n", command, self.address),
        };
        Ok(ExecOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }

    async fn upload(&mut self, _local_path: &Path, remote_path: &str) -> Result<u64, SessionError> {
        self.log.push(format!("upload {} {}", self.address, remote_path));
        if self.upload_fails {
            return Err(SessionError::upload_failed("permission denied"));
        }
        Ok(1)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.log.push(format!("release {}", self.address));
        tokio::time::sleep(self.delay).await;
        self.log.push(format!("close {}", self.address));
        Ok(())
    }
}
