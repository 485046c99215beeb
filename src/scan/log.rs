//! Diagnostic log ring buffer and publication throttle / 日志环形缓冲与节流

use serde::{Deserialize, Serialize, Serializer};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use super::types::LogLevel;

/// Worker id used for engine-level lines / 系统日志的 worker id
pub const SYSTEM_WORKER: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogLine {
    /// Local time, HH:MM:SS.mmm
    pub timestamp: String,
    pub worker_id: i32,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn now(worker_id: i32, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            worker_id,
            level,
            message: message.into(),
        }
    }
}

/// Fixed-capacity FIFO log; the oldest line is dropped on overflow / 固定容量日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBuffer {
    capacity: usize,
    lines: VecDeque<LogLine>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity.min(256)),
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }
}

impl Serialize for LogBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.lines.iter())
    }
}

/// Minimum-interval gate for non-critical publications / 按时间间隔节流
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True when at least `interval` has passed since the last accepted call.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
