//! 运行时状态模块
//!
//! 运行期间唯一的共享资源：事件通道

pub mod event_sink;

pub use event_sink::{channel, EventSink, EventStream};
