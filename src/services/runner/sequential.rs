//! 顺序策略
//!
//! 逐台主机执行完整任务列表：连接 → 按序执行 → 关闭 → 下一台。
//! 单台主机的连接失败或前置条件失败只跳过该主机。

use crate::domain::event::{Event, EventKind};
use crate::domain::host::Host;
use crate::domain::task::Task;
use crate::error::SessionError;
use crate::services::session::RemoteSession;

use super::{check_local_source, execute_task, RunContext, RunOutcome, RunStats, TaskOutcome};

/// 主机之间的分隔线
const SEPARATOR: &str = "--------------------------------------------------";

/// 执行顺序策略
pub async fn run(ctx: &RunContext, hosts: &[Host], tasks: &[Task]) -> RunOutcome {
    let mut stats = RunStats::new(hosts.len());

    for (index, host) in hosts.iter().enumerate() {
        if ctx.is_cancelled() {
            break;
        }
        if index > 0 {
            ctx.emit(Event::new(EventKind::Separator, SEPARATOR));
        }

        ctx.emit(
            Event::new(
                EventKind::Connecting,
                format!("Connecting to {} ({})...", host.label(), host.endpoint()),
            )
            .for_host(host.label()),
        );

        let mut session = match ctx.open_session(host).await {
            Ok(session) => session,
            Err(SessionError::Cancelled) => break,
            Err(e) => {
                stats.unreachable += 1;
                ctx.emit(
                    Event::new(
                        EventKind::ConnectFailed,
                        format!("Failed to connect to {}: {}", host.endpoint(), e),
                    )
                    .for_host(host.label()),
                );
                continue;
            }
        };

        run_host(ctx, &mut session, tasks, &mut stats).await;

        session.close().await;
        ctx.emit(
            Event::new(EventKind::Disconnected, format!("Disconnected from {}", host.label()))
                .for_host(host.label()),
        );
    }

    if ctx.is_cancelled() {
        ctx.report_cancelled();
    }

    tracing::info!(run_id = %ctx.run_id, ?stats, "Sequential run finished");
    RunOutcome::Completed(stats)
}

/// 在一台主机上按序执行任务
///
/// 前置条件失败时停止该主机剩余任务
async fn run_host(ctx: &RunContext, session: &mut RemoteSession, tasks: &[Task], stats: &mut RunStats) {
    let host = session.host().to_string();

    for task in tasks {
        if ctx.is_cancelled() {
            return;
        }

        if let Err(e) = check_local_source(task).await {
            stats.errors += 1;
            ctx.emit(
                Event::new(
                    EventKind::PreconditionFailed,
                    format!("{}, skipping remaining tasks on {}", e, host),
                )
                .for_host(&host)
                .for_task(task.name()),
            );
            return;
        }

        let verb = match task {
            Task::RunCommand { .. } => "Executing",
            Task::UploadFile { .. } => "Uploading",
        };
        ctx.emit(
            Event::new(EventKind::TaskStart, format!("{} {}...", verb, task.name()))
                .for_host(&host)
                .for_task(task.name()),
        );

        let outcome = execute_task(ctx, session, task).await;
        stats.record(outcome);
        if outcome == TaskOutcome::Cancelled {
            return;
        }
    }
}
