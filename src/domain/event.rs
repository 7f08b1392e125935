//! 运行事件领域模型
//!
//! 连接生命周期、任务开始、任务输出与失败都以 [`Event`] 的形式推送给调用方。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 事件严重程度
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    /// HTML 渲染颜色
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Info => "#007bff",
            Severity::Success => "#28a745",
            Severity::Warn => "#ffa500",
            Severity::Error => "#dc3545",
        }
    }
}

/// 事件图标
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Host,
    Launch,
    Done,
    Output,
    Error,
    Separator,
    Warn,
    None,
}

impl Marker {
    pub fn icon(&self) -> &'static str {
        match self {
            Marker::Host => "🖥️",
            Marker::Launch => "🚀",
            Marker::Done => "✅",
            Marker::Output => "✨",
            Marker::Error => "❎",
            Marker::Separator => "💠",
            Marker::Warn => "⚠️",
            Marker::None => "",
        }
    }
}

/// 事件类型
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connecting,
    ConnectFailed,
    TaskStart,
    TaskSuccess,
    /// 命令以非零状态退出
    TaskFailure,
    /// 传输、超时或通道错误
    TaskError,
    PreconditionFailed,
    Disconnected,
    Separator,
    Cancelled,
    Fatal,
    /// 终止事件，每次运行恰好一次且最后发出
    RunFinished,
}

impl EventKind {
    fn default_severity(&self) -> Severity {
        match self {
            EventKind::TaskSuccess => Severity::Success,
            EventKind::TaskStart | EventKind::Cancelled => Severity::Warn,
            EventKind::ConnectFailed
            | EventKind::TaskFailure
            | EventKind::TaskError
            | EventKind::PreconditionFailed
            | EventKind::Fatal => Severity::Error,
            _ => Severity::Info,
        }
    }

    fn default_marker(&self) -> Marker {
        match self {
            EventKind::Connecting | EventKind::Disconnected => Marker::Host,
            EventKind::TaskStart => Marker::Launch,
            EventKind::TaskSuccess | EventKind::TaskFailure => Marker::Output,
            EventKind::ConnectFailed
            | EventKind::TaskError
            | EventKind::PreconditionFailed
            | EventKind::Fatal => Marker::Error,
            EventKind::Separator => Marker::Separator,
            EventKind::Cancelled => Marker::Warn,
            EventKind::RunFinished => Marker::None,
        }
    }
}

/// 运行事件
#[derive(Clone, Debug, Serialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// 主机标签（运行级事件为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub kind: EventKind,
    pub severity: Severity,
    pub marker: Marker,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub message: String,
    /// 捕获的 stdout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// 是否渲染为块级片段（输出 `<pre>`，不追加换行）
    pub is_html_fragment: bool,
}

impl Event {
    /// 创建事件，严重程度与图标取该类型的默认值
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            host: None,
            kind,
            severity: kind.default_severity(),
            marker: kind.default_marker(),
            task: None,
            message: message.into(),
            output: None,
            exit_code: None,
            duration_ms: None,
            is_html_fragment: false,
        }
    }

    /// 终止事件
    pub fn finished() -> Self {
        Self::new(EventKind::RunFinished, "")
    }

    pub fn for_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn for_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = marker;
        self
    }

    /// 附加命令输出，事件改为块级片段
    pub fn with_output(mut self, output: impl Into<String>, exit_code: i32) -> Self {
        self.output = Some(output.into());
        self.exit_code = Some(exit_code);
        self.is_html_fragment = true;
        self
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::RunFinished
    }

    /// 纯文本渲染：`icon [time] [host] message`
    pub fn render_plain(&self) -> String {
        let mut line = String::new();
        if self.marker != Marker::None {
            line.push_str(self.marker.icon());
            line.push(' ');
        }
        line.push_str(&format!("[{}]", self.timestamp.format("%Y-%m-%d %H:%M:%S")));
        if let Some(ref host) = self.host {
            line.push_str(&format!(" [{}]", host));
        }
        line.push(' ');
        line.push_str(&self.message);
        if let Some(ref output) = self.output {
            let output = output.trim_end_matches('\n');
            if !output.is_empty() {
                line.push('\n');
                line.push_str(output);
            }
        }
        line
    }

    /// HTML 片段渲染，供展示层直接追加
    pub fn render_html(&self) -> String {
        let mut text = String::new();
        if self.marker != Marker::None {
            text.push_str(self.marker.icon());
            text.push(' ');
        }
        text.push_str(&format!("[{}]", self.timestamp.format("%Y-%m-%d %H:%M:%S")));
        if let Some(ref host) = self.host {
            text.push_str(&format!(" [{}]", escape_html(host)));
        }
        text.push(' ');
        text.push_str(&escape_html(&self.message).replace('\n', "<br>"));

        if let Some(ref output) = self.output {
            text.push_str(&format!(
                ":<pre style=\"padding: 0; margin: 0; color: #212529\">{}</pre>",
                escape_html(output)
            ));
        }

        let mut html = format!(
            "<span style=\"color: {}\">{}</span>",
            self.severity.color(),
            text
        );
        if !self.is_html_fragment {
            html.push_str("<br />");
        }
        html
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
