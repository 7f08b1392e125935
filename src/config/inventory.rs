//! 主机与任务清单加载
//!
//! 支持两种主机文件格式：
//! - 列表：`- {name, addr, port, user, password}`
//! - 映射：`web-1: {host, port, user, password}`
//!
//! 任务文件是键值记录列表，由 [`Task::from_record`] 解析。

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::host::{Credential, Host, DEFAULT_SSH_PORT};
use crate::domain::task::Task;
use crate::error::ConfigError;

/// 主机文件中的单条记录
#[derive(Debug, Deserialize)]
struct HostEntry {
    name: Option<String>,
    #[serde(alias = "host", alias = "address")]
    addr: Option<String>,
    port: Option<u16>,
    #[serde(alias = "username")]
    user: Option<String>,
    password: Option<String>,
    key_file: Option<PathBuf>,
    passphrase: Option<String>,
}

impl HostEntry {
    fn into_host(self, fallback_name: Option<String>) -> Result<Host, ConfigError> {
        let address = self.addr.unwrap_or_else(|| "127.0.0.1".to_string());
        let name = self.name.or(fallback_name);
        let label = name.clone().unwrap_or_else(|| address.clone());

        let credential = match (self.key_file, self.password) {
            (Some(path), _) => Credential::PrivateKey {
                path,
                passphrase: self.passphrase,
            },
            (None, Some(password)) => Credential::Password(password),
            (None, None) => {
                return Err(ConfigError::InvalidHost(
                    label,
                    "either password or key_file is required".to_string(),
                ))
            }
        };

        Ok(Host {
            name,
            address,
            port: self.port.unwrap_or(DEFAULT_SSH_PORT),
            username: self.user.unwrap_or_else(|| "root".to_string()),
            credential,
        })
    }
}

/// 从文件加载主机列表
pub fn load_hosts(path: impl AsRef<Path>) -> Result<Vec<Host>, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_hosts(&content, &path.display().to_string())
}

/// 解析主机 YAML，保持配置顺序
pub fn parse_hosts(content: &str, origin: &str) -> Result<Vec<Host>, ConfigError> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| yaml_error(origin, e))?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .into_iter()
            .map(|item| {
                let entry: HostEntry =
                    serde_yaml::from_value(item).map_err(|e| yaml_error(origin, e))?;
                entry.into_host(None)
            })
            .collect(),
        Value::Mapping(map) => map
            .into_iter()
            .map(|(key, item)| {
                let name = scalar_to_string(&key).ok_or_else(|| {
                    ConfigError::InvalidHost(format!("{:?}", key), "host name must be a scalar".to_string())
                })?;
                let entry: HostEntry =
                    serde_yaml::from_value(item).map_err(|e| yaml_error(origin, e))?;
                entry.into_host(Some(name))
            })
            .collect(),
        _ => Err(ConfigError::InvalidHost(
            origin.to_string(),
            "expected a list or a mapping of hosts".to_string(),
        )),
    }
}

/// 从文件加载任务列表
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<Task>, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;
    parse_tasks(&content, &path.display().to_string())
}

/// 解析任务 YAML
///
/// 未知任务类型在这里报错，早于任何连接
pub fn parse_tasks(content: &str, origin: &str) -> Result<Vec<Task>, ConfigError> {
    let records: Option<Vec<HashMap<String, Value>>> =
        serde_yaml::from_str(content).map_err(|e| yaml_error(origin, e))?;

    records
        .unwrap_or_default()
        .into_iter()
        .map(|raw| {
            let record: HashMap<String, String> = raw
                .into_iter()
                .filter_map(|(k, v)| scalar_to_string(&v).map(|v| (k, v)))
                .collect();
            Task::from_record(&record).map_err(ConfigError::from)
        })
        .collect()
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn yaml_error(origin: &str, source: serde_yaml::Error) -> ConfigError {
    ConfigError::Yaml {
        path: origin.to_string(),
        source,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
