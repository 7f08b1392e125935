//! 配置模块
//!
//! 环境变量解析与主机/任务清单加载

pub mod env;
pub mod inventory;

pub use env::EngineConfig;
pub use inventory::{load_hosts, load_tasks, parse_hosts, parse_tasks};
