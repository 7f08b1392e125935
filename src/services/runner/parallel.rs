//! 并行策略
//!
//! 每台主机一个工作单元，独占自己的会话。驱动方按任务顺序把同一个任务
//! 广播给所有已连接的工作单元，全部完成后才推进到下一个任务。

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::domain::event::{Event, EventKind};
use crate::domain::host::Host;
use crate::domain::task::Task;
use crate::error::SessionError;

use super::{check_local_source, execute_task, RunContext, RunOutcome, RunStats, TaskOutcome};

/// 分派给工作单元的任务
struct Job {
    /// 任务在列表中的下标
    index: usize,
    done: oneshot::Sender<TaskOutcome>,
}

/// 主机工作单元句柄
struct HostWorker {
    label: String,
    jobs: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

impl HostWorker {
    /// 启动工作单元，返回句柄与连接结果
    fn spawn(ctx: RunContext, host: Host, tasks: Arc<[Task]>) -> (Self, oneshot::Receiver<bool>) {
        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = oneshot::channel();
        let label = host.label().to_string();

        let handle = tokio::spawn(worker_loop(ctx, host, tasks, ready_tx, jobs_rx));

        (
            Self {
                label,
                jobs: jobs_tx,
                handle,
            },
            ready_rx,
        )
    }

    /// 分派任务，返回完成通知
    async fn dispatch(&self, index: usize) -> TaskOutcome {
        let (done_tx, done_rx) = oneshot::channel();
        if self.jobs.send(Job { index, done: done_tx }).await.is_err() {
            return TaskOutcome::Errored;
        }
        done_rx.await.unwrap_or(TaskOutcome::Errored)
    }

    /// 关闭任务通道并等待工作单元关闭会话
    async fn shutdown(self) {
        drop(self.jobs);
        if let Err(e) = self.handle.await {
            tracing::error!(host = %self.label, error = %e, "Host worker terminated abnormally");
        }
    }
}

/// 工作单元主循环
async fn worker_loop(
    ctx: RunContext,
    host: Host,
    tasks: Arc<[Task]>,
    ready: oneshot::Sender<bool>,
    mut jobs: mpsc::Receiver<Job>,
) {
    let label = host.label().to_string();

    ctx.emit(
        Event::new(
            EventKind::Connecting,
            format!("Connecting to {} ({})...", label, host.endpoint()),
        )
        .for_host(&label),
    );

    let mut session = match ctx.open_session(&host).await {
        Ok(session) => session,
        Err(SessionError::Cancelled) => {
            let _ = ready.send(false);
            return;
        }
        Err(e) => {
            ctx.emit(
                Event::new(
                    EventKind::ConnectFailed,
                    format!("Failed to connect to {}: {}", host.endpoint(), e),
                )
                .for_host(&label),
            );
            let _ = ready.send(false);
            return;
        }
    };
    let _ = ready.send(true);

    while let Some(job) = jobs.recv().await {
        let outcome = match tasks.get(job.index) {
            Some(task) => execute_task(&ctx, &mut session, task).await,
            None => {
                ctx.emit(
                    Event::new(EventKind::TaskError, format!("No task at position {}", job.index))
                        .for_host(&label),
                );
                TaskOutcome::Errored
            }
        };
        let _ = job.done.send(outcome);
    }

    session.close().await;
    ctx.emit(
        Event::new(EventKind::Disconnected, format!("Disconnected from {}", label)).for_host(&label),
    );
}

/// 执行并行策略
pub async fn run(ctx: &RunContext, hosts: &[Host], tasks: Arc<[Task]>) -> RunOutcome {
    // 所有主机共享同一个任务列表，先统一检查本地文件
    for task in tasks.iter() {
        if let Err(e) = check_local_source(task).await {
            tracing::error!(run_id = %ctx.run_id, task = %task.name(), error = %e, "Parallel precondition failed");
            ctx.emit(
                Event::new(EventKind::Fatal, format!("Parallel execution aborted: {}", e))
                    .for_task(task.name()),
            );
            return RunOutcome::Aborted;
        }
    }

    let mut stats = RunStats::new(hosts.len());

    let (workers, ready): (Vec<_>, Vec<_>) = hosts
        .iter()
        .map(|host| HostWorker::spawn(ctx.clone(), host.clone(), tasks.clone()))
        .unzip();

    let connected = join_all(ready).await;

    let mut live = Vec::new();
    let mut finished = Vec::new();
    for (worker, ok) in workers.into_iter().zip(connected) {
        if ok.unwrap_or(false) {
            live.push(worker);
        } else {
            if !ctx.is_cancelled() {
                stats.unreachable += 1;
            }
            finished.push(worker);
        }
    }

    tracing::info!(
        run_id = %ctx.run_id,
        connected = live.len(),
        unreachable = stats.unreachable,
        "Parallel sessions ready"
    );

    for (index, task) in tasks.iter().enumerate() {
        if ctx.is_cancelled() || live.is_empty() {
            break;
        }

        let verb = match task {
            Task::RunCommand { .. } => "Executing",
            Task::UploadFile { .. } => "Uploading",
        };
        ctx.emit(
            Event::new(EventKind::TaskStart, format!("{} {} on all hosts...", verb, task.name()))
                .for_task(task.name()),
        );

        // 屏障：所有主机完成第 k 个任务后才开始第 k+1 个
        let outcomes = join_all(live.iter().map(|worker| worker.dispatch(index))).await;
        for outcome in outcomes {
            stats.record(outcome);
        }
    }

    // 同时关闭所有会话
    join_all(live.into_iter().chain(finished).map(HostWorker::shutdown)).await;

    if ctx.is_cancelled() {
        ctx.report_cancelled();
    }

    tracing::info!(run_id = %ctx.run_id, ?stats, "Parallel run finished");
    RunOutcome::Completed(stats)
}
