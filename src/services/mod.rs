//! 服务层模块
//!
//! 会话、执行策略与引擎门面

pub mod engine;
pub mod runner;
pub mod session;

pub use engine::{Engine, RunHandle};
pub use runner::RunStats;
pub use session::{CommandOutput, RemoteSession, SessionOptions, SessionState, UploadReport};
