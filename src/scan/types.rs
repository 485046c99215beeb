use serde::{Deserialize, Serialize};

/// Worker status / 工作线程状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Running,
    Success,
    Fail,
    Stopped,
}

/// Log level / 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
}

/// Why a worker left its loop / worker 停止原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Hit,
    UserCancel,
    Exhausted,
    Fault,
}

impl StopReason {
    pub fn message(self) -> &'static str {
        match self {
            StopReason::Hit => "stopped by hit",
            StopReason::UserCancel => "stopped by user",
            StopReason::Exhausted => "queue exhausted",
            StopReason::Fault => "stopped by fault",
        }
    }
}

/// Terminal outcome of a run, exactly one per run / 扫描终态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    Exhausted,
    UserCancelled,
    Fatal(String),
}

/// Hard cap on identifiers per run; configuration may only lower it / 单次扫描候选数上限
pub const MAX_CANDIDATES: u64 = 10_000;
/// Hard cap on the worker pool; configuration may only lower it / 并发上限
pub const MAX_PARALLELISM: usize = 32;

/// Error text published when the range is consumed without a hit.
pub const NOT_FOUND: &str = "not found";

impl ScanOutcome {
    /// Value of `RunState.error` for this outcome.
    pub fn error_text(&self) -> Option<String> {
        match self {
            ScanOutcome::Success | ScanOutcome::UserCancelled => None,
            ScanOutcome::Exhausted => Some(NOT_FOUND.to_string()),
            ScanOutcome::Fatal(message) => Some(message.clone()),
        }
    }
}
