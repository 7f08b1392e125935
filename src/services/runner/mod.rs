//! 执行策略模块
//!
//! 顺序策略与并行策略共用的任务执行逻辑

pub mod context;
pub mod parallel;
pub mod sequential;

use std::fmt;

use crate::domain::event::{Event, EventKind, Marker, Severity};
use crate::domain::task::Task;
use crate::error::{PreconditionError, SessionError};
use crate::services::session::RemoteSession;

pub use context::RunContext;

/// 单个任务在单台主机上的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// 命令以非零状态退出
    Failed(i32),
    /// 传输、超时或通道错误
    Errored,
    Cancelled,
}

/// 运行统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub hosts: usize,
    pub unreachable: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn new(hosts: usize) -> Self {
        Self {
            hosts,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Errored => self.errors += 1,
            TaskOutcome::Cancelled => {}
        }
    }

    /// 是否全部成功
    pub fn is_clean(&self) -> bool {
        self.unreachable == 0 && self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} host(s): {} succeeded, {} failed, {} errors, {} unreachable",
            self.hosts, self.succeeded, self.failed, self.errors, self.unreachable
        )
    }
}

/// 策略执行结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunStats),
    /// 前置检查失败，未建立任何连接
    Aborted,
}

/// 检查上传任务的本地源（文件或目录）
pub async fn check_local_source(task: &Task) -> Result<(), PreconditionError> {
    let Some(path) = task.local_source() else {
        return Ok(());
    };
    let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() || meta.is_dir() => Ok(()),
        Ok(_) => Err(PreconditionError::Unsupported(path)),
        Err(_) => Err(PreconditionError::LocalFileMissing(path)),
    }
}

/// 在会话上执行一个任务并发出完成事件
///
/// 不发出开始事件，开始事件由各策略自行决定
pub async fn execute_task(ctx: &RunContext, session: &mut RemoteSession, task: &Task) -> TaskOutcome {
    let host = session.host().to_string();

    match task {
        Task::RunCommand { name, command } => {
            let result = tokio::select! {
                _ = ctx.cancel_token.cancelled() => Err(SessionError::Cancelled),
                result = session.run_command(command) => result,
            };

            match result {
                Ok(output) if output.success() => {
                    ctx.emit(
                        Event::new(EventKind::TaskSuccess, name.as_str())
                            .for_host(&host)
                            .for_task(name.as_str())
                            .with_output(output.stdout, output.exit_code)
                            .with_duration(output.duration),
                    );
                    TaskOutcome::Succeeded
                }
                Ok(output) => {
                    let mut captured = output.stdout;
                    if !output.stderr.is_empty() {
                        captured.push_str(&output.stderr);
                    }
                    ctx.emit(
                        Event::new(
                            EventKind::TaskFailure,
                            format!("{} (exit status {})", name, output.exit_code),
                        )
                        .for_host(&host)
                        .for_task(name.as_str())
                        .with_output(captured, output.exit_code)
                        .with_duration(output.duration),
                    );
                    TaskOutcome::Failed(output.exit_code)
                }
                Err(e) => report_error(ctx, &host, name, "execute", e),
            }
        }
        Task::UploadFile {
            name,
            local_path,
            remote_path,
        } => {
            let result = tokio::select! {
                _ = ctx.cancel_token.cancelled() => Err(SessionError::Cancelled),
                result = session.upload_file(local_path, remote_path) => result,
            };

            match result {
                Ok(report) => {
                    ctx.emit(
                        Event::new(
                            EventKind::TaskSuccess,
                            format!("Successfully uploaded {} to {}", name, remote_path),
                        )
                        .for_host(&host)
                        .for_task(name.as_str())
                        .with_marker(Marker::Done)
                        .with_duration(report.duration),
                    );
                    TaskOutcome::Succeeded
                }
                Err(e) => report_error(ctx, &host, name, "upload", e),
            }
        }
    }
}

fn report_error(ctx: &RunContext, host: &str, name: &str, verb: &str, error: SessionError) -> TaskOutcome {
    if error == SessionError::Cancelled {
        ctx.emit(
            Event::new(EventKind::TaskError, format!("{} interrupted by cancellation", name))
                .for_host(host)
                .for_task(name)
                .with_severity(Severity::Warn),
        );
        return TaskOutcome::Cancelled;
    }

    ctx.emit(
        Event::new(EventKind::TaskError, format!("Failed to {} {}: {}", verb, name, error))
            .for_host(host)
            .for_task(name),
    );
    TaskOutcome::Errored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_summary() {
        let mut stats = RunStats::new(2);
        stats.record(TaskOutcome::Succeeded);
        stats.record(TaskOutcome::Failed(2));
        stats.record(TaskOutcome::Cancelled);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert!(!stats.is_clean());
        assert_eq!(
            stats.to_string(),
            "2 host(s): 1 succeeded, 1 failed, 0 errors, 0 unreachable"
        );
    }

    #[tokio::test]
    async fn test_check_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.conf");
        std::fs::write(&file, "x").unwrap();

        assert!(check_local_source(&Task::command("ls", "ls")).await.is_ok());
        assert!(check_local_source(&Task::upload("a", &file, "/etc/app.conf")).await.is_ok());

        let err = check_local_source(&Task::upload("b", dir.path().join("nope"), "/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PreconditionError::LocalFileMissing(_)));

        // 目录按递归上传处理
        assert!(check_local_source(&Task::upload("c", dir.path(), "/x")).await.is_ok());
    }
}
