//! 统一错误处理
//!
//! 引擎各层的错误类型。运行期错误全部转换为事件，不会中断运行驱动。

use std::path::PathBuf;
use thiserror::Error;

/// 任务配置错误（加载时暴露，早于任何会话建立）
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error("Unknown task type: {0}")]
    UnknownTaskKind(String),

    #[error("Task '{task}' is missing required field '{field}'")]
    MissingField { task: String, field: &'static str },
}

/// 远程会话错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// 主机不可达或握手失败
    #[error("SSH connect error: {0}")]
    Connect(String),

    /// 认证被拒绝
    #[error("Authentication rejected for user '{0}'")]
    AuthRejected(String),

    #[error("SSH connect timed out after {0}s")]
    ConnectTimeout(u64),

    /// 会话已关闭
    #[error("Session is closed")]
    Closed,

    /// 通道建立或读写失败
    #[error("Channel error: {0}")]
    Channel(String),

    /// 命令超时
    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("Operation was cancelled")]
    Cancelled,

    /// 上传失败（权限、路径、断线）
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },
}

impl SessionError {
    /// 创建上传失败错误
    pub fn upload_failed(reason: impl Into<String>) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }
}

impl From<russh::Error> for SessionError {
    fn from(e: russh::Error) -> Self {
        SessionError::Channel(e.to_string())
    }
}

/// 本地前置条件错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreconditionError {
    #[error("Local file not found: {}", .0.display())]
    LocalFileMissing(PathBuf),

    #[error("Local path is neither a file nor a directory: {}", .0.display())]
    Unsupported(PathBuf),
}

/// 引擎门面错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// 同一个引擎实例同时只允许一次运行
    #[error("A run is already in progress ({0})")]
    RunInProgress(String),
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid host entry '{0}': {1}")]
    InvalidHost(String, String),

    #[error(transparent)]
    Task(#[from] TaskError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TaskError::UnknownTaskKind("script".to_string());
        assert_eq!(err.to_string(), "Unknown task type: script");

        let err = SessionError::upload_failed("permission denied");
        assert_eq!(err.to_string(), "Upload failed: permission denied");

        let err = PreconditionError::LocalFileMissing(PathBuf::from("/tmp/nope"));
        assert_eq!(err.to_string(), "Local file not found: /tmp/nope");
    }
}
