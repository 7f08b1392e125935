//! 任务领域模型
//!
//! 纯数据 + 必填字段校验，不包含执行逻辑

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::TaskError;

/// 一个远程工作单元
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// 执行远程命令
    RunCommand { name: String, command: String },
    /// 上传本地文件
    UploadFile {
        name: String,
        local_path: PathBuf,
        remote_path: String,
    },
}

impl Task {
    pub fn command(name: impl Into<String>, command: impl Into<String>) -> Self {
        Task::RunCommand {
            name: name.into(),
            command: command.into(),
        }
    }

    pub fn upload(
        name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
    ) -> Self {
        Task::UploadFile {
            name: name.into(),
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }

    /// 从通用键值记录解析任务
    ///
    /// `type` 必须是 `command` 或 `file`；缺省的 `name` 取命令行或远程路径。
    pub fn from_record(record: &HashMap<String, String>) -> Result<Self, TaskError> {
        let field = |key: &str| record.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let kind = field("type").unwrap_or_default();

        match kind {
            "command" => {
                let name = field("name");
                let command = field("command").ok_or_else(|| TaskError::MissingField {
                    task: name.unwrap_or("<unnamed>").to_string(),
                    field: "command",
                })?;
                Ok(Task::command(name.unwrap_or(command), command))
            }
            "file" => {
                let name = field("name");
                let missing = |field: &'static str| TaskError::MissingField {
                    task: name.unwrap_or("<unnamed>").to_string(),
                    field,
                };
                let local_path = field("local_path").ok_or_else(|| missing("local_path"))?;
                let remote_path = field("remote_path").ok_or_else(|| missing("remote_path"))?;
                Ok(Task::upload(
                    name.unwrap_or(remote_path),
                    local_path,
                    remote_path,
                ))
            }
            other => Err(TaskError::UnknownTaskKind(other.to_string())),
        }
    }

    /// 显示名称
    pub fn name(&self) -> &str {
        match self {
            Task::RunCommand { name, .. } | Task::UploadFile { name, .. } => name,
        }
    }

    /// 任务类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            Task::RunCommand { .. } => "command",
            Task::UploadFile { .. } => "file",
        }
    }

    /// 上传任务的本地源路径
    pub fn local_source(&self) -> Option<&PathBuf> {
        match self {
            Task::UploadFile { local_path, .. } => Some(local_path),
            Task::RunCommand { .. } => None,
        }
    }
}
