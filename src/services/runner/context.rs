//! 运行上下文
//!
//! 一次运行中各执行单元共享的只读状态与事件通道

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::event::{Event, EventKind, Severity};
use crate::domain::host::Host;
use crate::error::SessionError;
use crate::infra::transport::Connector;
use crate::services::session::{RemoteSession, SessionOptions};
use crate::state::EventSink;

/// 运行上下文
///
/// 克隆后交给每个主机工作单元；除事件通道外没有跨主机的可变状态
#[derive(Clone)]
pub struct RunContext {
    /// 运行 ID
    pub run_id: String,
    /// 事件发送通道
    pub sink: EventSink,
    /// 取消令牌
    pub cancel_token: CancellationToken,
    /// 远程 shell 能力
    pub connector: Arc<dyn Connector>,
    /// 会话选项
    pub options: SessionOptions,
    cancel_reported: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new(
        run_id: String,
        sink: EventSink,
        cancel_token: CancellationToken,
        connector: Arc<dyn Connector>,
        options: SessionOptions,
    ) -> Self {
        Self {
            run_id,
            sink,
            cancel_token,
            connector,
            options,
            cancel_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 发送事件
    pub fn emit(&self, event: Event) {
        match event.severity {
            Severity::Error => tracing::warn!(
                run_id = %self.run_id,
                host = ?event.host,
                kind = ?event.kind,
                "{}", event.message
            ),
            _ => tracing::debug!(
                run_id = %self.run_id,
                host = ?event.host,
                kind = ?event.kind,
                "{}", event.message
            ),
        }
        self.sink.emit(event);
    }

    /// 检查是否被取消
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 报告取消，每次运行只发出一次
    pub fn report_cancelled(&self) {
        if self.cancel_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::warn!(run_id = %self.run_id, "Run cancelled");
        self.emit(Event::new(EventKind::Cancelled, "Run cancelled, closing open sessions"));
    }

    /// 建立会话，取消时立即返回 `SessionError::Cancelled`
    pub async fn open_session(&self, host: &Host) -> Result<RemoteSession, SessionError> {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(SessionError::Cancelled),
            result = RemoteSession::open(&self.connector, host, self.options) => result,
        }
    }
}
