//! 领域模型模块
//!
//! 纯数据结构，不依赖 tokio

pub mod event;
pub mod host;
pub mod policy;
pub mod task;

// Re-exports for convenience
pub use event::{Event, EventKind, Marker, Severity};
pub use host::{Credential, Host, DEFAULT_SSH_PORT};
pub use policy::ExecutionPolicy;
pub use task::Task;
