//! 远程 shell 能力抽象
//!
//! 引擎只依赖这两个 trait；默认实现见 [`super::ssh`]。

use async_trait::async_trait;
use std::path::Path;

use crate::domain::host::Host;
use crate::error::SessionError;

/// 远程命令的原始执行结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// 建立到主机的已认证连接
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &Host) -> Result<Box<dyn Transport>, SessionError>;
}

/// 一条已认证的远程连接
#[async_trait]
pub trait Transport: Send {
    /// 执行命令直到远程进程退出；非零退出码不是错误
    async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError>;

    /// 上传本地文件或目录（递归），返回传输字节数
    async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, SessionError>;

    /// 释放底层连接
    async fn close(&mut self) -> Result<(), SessionError>;
}
