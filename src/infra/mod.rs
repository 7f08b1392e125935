//! 基础设施模块
//!
//! 封装外部依赖（SSH 客户端）

pub mod ssh;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use ssh::SshConnector;
pub use transport::{Connector, ExecOutput, Transport};
