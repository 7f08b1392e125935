//! 事件通道
//!
//! 多生产者、单消费者的有序事件通道。生产者从不阻塞，消费者按到达顺序读取，
//! 以 `RunFinished` 作为终止标记。

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::domain::event::Event;

/// 事件发送端
///
/// 可克隆，每个主机工作单元持有一份。
/// 发送在 `finished` 锁内完成，终止事件之后不会再有事件入队。
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<Event>,
    finished: Arc<Mutex<bool>>,
}

/// 事件接收端
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
    done: bool,
}

/// 创建一对事件通道
pub fn channel() -> (EventSink, EventStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        EventSink {
            sender,
            finished: Arc::new(Mutex::new(false)),
        },
        EventStream {
            receiver,
            done: false,
        },
    )
}

impl EventSink {
    /// 发送事件
    ///
    /// 终止事件发出后的事件会被忽略
    pub fn emit(&self, event: Event) {
        let finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
        if *finished {
            tracing::warn!(kind = ?event.kind, "Event emitted after run finished, ignoring");
            return;
        }
        if self.sender.send(event).is_err() {
            tracing::debug!("Event stream dropped by consumer");
        }
    }

    /// 发出终止事件，仅第一次调用生效
    pub fn finish(&self) {
        let mut finished = self.finished.lock().unwrap_or_else(|e| e.into_inner());
        if *finished {
            return;
        }
        *finished = true;
        let _ = self.sender.send(Event::finished());
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventStream {
    /// 接收下一个事件，终止事件之后返回 None
    pub async fn recv(&mut self) -> Option<Event> {
        if self.done {
            return None;
        }
        let event = self.receiver.recv().await?;
        if event.is_terminal() {
            self.done = true;
        }
        Some(event)
    }

    /// 读取所有事件直到终止事件（包含终止事件）
    pub async fn collect_until_finished(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.done = true;
                }
                Poll::Ready(Some(event))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_fifo_and_terminal() {
        let (sink, mut stream) = channel();

        sink.emit(Event::new(EventKind::Connecting, "a"));
        sink.emit(Event::new(EventKind::Disconnected, "b"));
        sink.finish();
        sink.finish();
        sink.emit(Event::new(EventKind::Fatal, "late"));

        let events = stream.collect_until_finished().await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Connecting, EventKind::Disconnected, EventKind::RunFinished]
        );
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_many_producers() {
        let (sink, stream) = channel();

        let mut handles = Vec::new();
        for i in 0..8 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    sink.emit(Event::new(EventKind::TaskSuccess, format!("{}-{}", i, j)));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        sink.finish();

        let events: Vec<Event> = stream.collect().await;
        assert_eq!(events.len(), 81);
        assert!(events.last().unwrap().is_terminal());

        // 同一生产者内的顺序保持不变
        let producer_3: Vec<_> = events
            .iter()
            .filter(|e| e.message.starts_with("3-"))
            .map(|e| e.message.clone())
            .collect();
        let expected: Vec<_> = (0..10).map(|j| format!("3-{}", j)).collect();
        assert_eq!(producer_3, expected);
    }

    #[tokio::test]
    async fn test_nothing_queued_after_terminal() {
        let (sink, mut stream) = channel();

        let mut handles = Vec::new();
        for i in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..500 {
                    sink.emit(Event::new(EventKind::TaskSuccess, format!("{}-{}", i, j)));
                    if j % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        tokio::task::yield_now().await;
        sink.finish();
        for handle in handles {
            handle.await.unwrap();
        }

        let events = stream.collect_until_finished().await;
        assert!(events.last().unwrap().is_terminal());
        assert!(stream.receiver.try_recv().is_err());
        assert!(sink.is_finished());
    }
}
