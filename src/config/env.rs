//! 环境变量配置加载

use std::env;
use std::time::Duration;
use tracing::warn;

use crate::domain::policy::ExecutionPolicy;
use constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_COMMAND_TIMEOUT_SECS};

/// 引擎配置
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// SSH 连接 + 认证超时
    pub connect_timeout: Duration,
    /// 单条命令/上传超时（None 表示不限时）
    pub command_timeout: Option<Duration>,
    /// 调用方未指定时使用的执行策略
    pub default_policy: ExecutionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: timeout_from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            default_policy: ExecutionPolicy::Sequential,
        }
    }
}

impl EngineConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let connect_timeout_secs = parse_var("TASK_RUNNER_CONNECT_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        let command_timeout_secs = parse_var("TASK_RUNNER_COMMAND_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);

        let default_policy = env::var("TASK_RUNNER_PARALLEL")
            .map(|v| ExecutionPolicy::from_str(&v))
            .unwrap_or_default();

        if connect_timeout_secs == 0 {
            warn!("TASK_RUNNER_CONNECT_TIMEOUT_SECS=0 is not allowed, using default");
        }

        Self {
            connect_timeout: Duration::from_secs(if connect_timeout_secs == 0 {
                DEFAULT_CONNECT_TIMEOUT_SECS
            } else {
                connect_timeout_secs
            }),
            command_timeout: timeout_from_secs(command_timeout_secs),
            default_policy,
        }
    }

    /// 覆盖命令超时（0 表示不限时）
    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout = timeout_from_secs(secs);
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        if secs > 0 {
            self.connect_timeout = Duration::from_secs(secs);
        }
        self
    }
}

fn parse_var(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name = %name, value = %raw, "Ignoring non-numeric environment variable");
            None
        }
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// 常量
pub mod constants {
    /// 连接超时（秒）
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

    /// 命令超时（秒），0 表示不限时
    pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 0;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
