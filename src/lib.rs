//! XJP Task Runner - 远程任务执行引擎
//!
//! 在一组 SSH 主机上按序执行命令与文件上传任务，
//! 支持逐台（顺序）与全部同步（并行）两种策略，执行过程以事件流输出。

pub mod error;
pub mod infra;
pub mod domain;
pub mod config;
pub mod state;
pub mod services;

pub use config::EngineConfig;
pub use domain::{Credential, Event, EventKind, ExecutionPolicy, Host, Severity, Task};
pub use error::{ConfigError, EngineError, SessionError};
pub use services::{Engine, RunHandle};

/// 初始化日志，`RUST_LOG` 未设置时使用 `default_filter`
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
