//! 远程主机领域模型

use std::path::PathBuf;

/// 默认 SSH 端口
pub const DEFAULT_SSH_PORT: u16 = 22;

/// 登录凭据
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// 密码认证
    Password(String),
    /// 私钥认证
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// 远程主机
///
/// 身份由 address + port 决定；`name` 只用于显示。
#[derive(Clone, Debug)]
pub struct Host {
    /// 显示名称（来自配置的 key，可选）
    pub name: Option<String>,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl Host {
    /// 使用密码凭据创建主机
    pub fn with_password(
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            address: address.into(),
            port,
            username: username.into(),
            credential: Credential::Password(password.into()),
        }
    }

    /// 设置显示名称
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 事件中使用的主机标签
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// `address:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.port.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_address_and_port() {
        let a = Host::with_password("10.0.0.1", 22, "ops", "x").named("web-1");
        let b = Host::with_password("10.0.0.1", 22, "root", "y");
        let c = Host::with_password("10.0.0.1", 2222, "ops", "x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_label_prefers_name() {
        let host = Host::with_password("10.0.0.1", 22, "ops", "x");
        assert_eq!(host.label(), "10.0.0.1");
        assert_eq!(host.clone().named("web-1").label(), "web-1");
        assert_eq!(host.endpoint(), "10.0.0.1:22");
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let host = Host::with_password("10.0.0.1", 22, "ops", "hunter2");
        assert!(!format!("{:?}", host).contains("hunter2"));
    }
}
