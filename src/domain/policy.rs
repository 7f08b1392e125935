//! 执行策略

use serde::Serialize;

/// 任务列表在主机集合上的执行方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// 逐台主机执行
    #[default]
    Sequential,
    /// 所有主机并发执行，每个任务之间同步
    Parallel,
}

impl ExecutionPolicy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "parallel" | "concurrent" | "1" | "true" => ExecutionPolicy::Parallel,
            _ => ExecutionPolicy::Sequential,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPolicy::Sequential => "sequential",
            ExecutionPolicy::Parallel => "parallel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(ExecutionPolicy::from_str("Parallel"), ExecutionPolicy::Parallel);
        assert_eq!(ExecutionPolicy::from_str("true"), ExecutionPolicy::Parallel);
        assert_eq!(ExecutionPolicy::from_str("sequential"), ExecutionPolicy::Sequential);
        assert_eq!(ExecutionPolicy::from_str("whatever"), ExecutionPolicy::Sequential);
    }
}
