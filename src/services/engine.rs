//! 引擎门面
//!
//! 运行入口：给定主机、任务与策略，在独立的 tokio 任务里驱动整个运行，
//! 调用方通过 [`RunHandle::events`] 读取事件直到 `RunFinished`。

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::domain::event::{Event, EventKind};
use crate::domain::host::Host;
use crate::domain::policy::ExecutionPolicy;
use crate::domain::task::Task;
use crate::error::EngineError;
use crate::infra::ssh::SshConnector;
use crate::infra::transport::Connector;
use crate::services::runner::{parallel, sequential, RunContext, RunOutcome, RunStats};
use crate::services::session::SessionOptions;
use crate::state::{self, EventStream};

/// 正在进行的运行
struct ActiveRun {
    run_id: String,
    cancel_token: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveRun>>>;

/// 运行结束时释放引擎占用
struct ActiveGuard(ActiveSlot);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// 任务执行引擎
pub struct Engine {
    connector: Arc<dyn Connector>,
    config: EngineConfig,
    active: ActiveSlot,
}

impl Engine {
    /// 使用自定义远程 shell 实现创建引擎
    pub fn new(connector: Arc<dyn Connector>, config: EngineConfig) -> Self {
        Self {
            connector,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// 使用 SSH 连接器创建引擎
    pub fn with_ssh(config: EngineConfig) -> Self {
        let connector = Arc::new(SshConnector::new(config.connect_timeout));
        Self::new(connector, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 启动一次运行
    ///
    /// 必须在 tokio 运行时内调用；同一实例上已有运行时返回 `RunInProgress`
    pub fn execute(
        &self,
        hosts: Vec<Host>,
        tasks: Vec<Task>,
        policy: ExecutionPolicy,
    ) -> Result<RunHandle, EngineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel_token = CancellationToken::new();

        {
            let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ref run) = *slot {
                return Err(EngineError::RunInProgress(run.run_id.clone()));
            }
            *slot = Some(ActiveRun {
                run_id: run_id.clone(),
                cancel_token: cancel_token.clone(),
            });
        }

        let (sink, events) = state::channel();
        let ctx = RunContext::new(
            run_id.clone(),
            sink,
            cancel_token.clone(),
            self.connector.clone(),
            SessionOptions {
                command_timeout: self.config.command_timeout,
            },
        );

        let guard = ActiveGuard(self.active.clone());
        let join = tokio::spawn(drive(ctx, hosts, tasks.into(), policy, guard));

        Ok(RunHandle {
            run_id,
            events,
            cancel_token,
            join,
        })
    }

    /// 取消当前运行，没有运行时返回 false
    pub fn cancel(&self) -> bool {
        let slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(run) => {
                tracing::info!(run_id = %run.run_id, "Cancelling run");
                run.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// 运行驱动
///
/// 最后一个事件总是 `RunFinished`；策略中止（未建立任何连接）或崩溃时没有统计
async fn drive(
    ctx: RunContext,
    hosts: Vec<Host>,
    tasks: Arc<[Task]>,
    policy: ExecutionPolicy,
    guard: ActiveGuard,
) -> Option<RunStats> {
    tracing::info!(
        run_id = %ctx.run_id,
        policy = policy.as_str(),
        hosts = hosts.len(),
        tasks = tasks.len(),
        "Run started"
    );

    let policy_ctx = ctx.clone();
    let result = tokio::spawn(async move {
        match policy {
            ExecutionPolicy::Sequential => sequential::run(&policy_ctx, &hosts, &tasks).await,
            ExecutionPolicy::Parallel => parallel::run(&policy_ctx, &hosts, tasks).await,
        }
    })
    .await;

    let stats = match result {
        Ok(RunOutcome::Completed(stats)) => {
            tracing::info!(run_id = %ctx.run_id, clean = stats.is_clean(), "Run completed on {}", stats);
            Some(stats)
        }
        Ok(RunOutcome::Aborted) => None,
        Err(e) => {
            tracing::error!(run_id = %ctx.run_id, error = %e, "Run driver failed");
            ctx.emit(Event::new(EventKind::Fatal, format!("Run driver failed: {}", e)));
            None
        }
    };

    // 先释放引擎，调用方收到 RunFinished 后即可发起下一次运行
    drop(guard);
    ctx.sink.finish();
    tracing::info!(run_id = %ctx.run_id, "Run finished");
    stats
}

/// 运行句柄
pub struct RunHandle {
    pub run_id: String,
    /// 事件流，以 `RunFinished` 结束
    pub events: EventStream,
    cancel_token: CancellationToken,
    join: JoinHandle<Option<RunStats>>,
}

impl RunHandle {
    /// 取消本次运行
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 等待驱动结束并返回统计
    ///
    /// 不读取事件流；未读的事件留在通道中
    pub async fn wait(self) -> Option<RunStats> {
        match self.join.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(run_id = %self.run_id, error = %e, "Run task join failed");
                None
            }
        }
    }

    /// 读取全部事件并返回统计
    pub async fn collect_with_stats(mut self) -> (Vec<Event>, Option<RunStats>) {
        let events = self.events.collect_until_finished().await;
        (events, self.wait().await)
    }

    /// 读取全部事件直到 `RunFinished`
    pub async fn collect(self) -> Vec<Event> {
        self.collect_with_stats().await.0
    }
}
