use serde::{Deserialize, Serialize};

use super::error::ScanError;
use super::log::{LogBuffer, LogLine};
use super::types::{ScanOutcome, WorkerStatus};
use crate::config::ScanSettings;
use crate::models::ScoreRecord;

/// Scan request / 扫描请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub name: String,
    pub id_range_start: i64,
    pub id_range_end: i64,
    pub parallelism: usize,
}

impl SearchRequest {
    pub fn new(name: impl Into<String>, id_range_start: i64, id_range_end: i64, parallelism: usize) -> Self {
        Self {
            name: name.into(),
            id_range_start,
            id_range_end,
            parallelism,
        }
    }

    /// Parse a textual range such as `4112440401-4112440410` / 解析学号范围
    pub fn parse_range(text: &str) -> Result<(i64, i64), ScanError> {
        let parts: Vec<&str> = text.split('-').collect();
        if parts.len() != 2 {
            return Err(ScanError::MalformedRange(text.to_string()));
        }
        let start: i64 = parts[0].trim().parse()
            .map_err(|_| ScanError::MalformedRange(text.to_string()))?;
        let end: i64 = parts[1].trim().parse()
            .map_err(|_| ScanError::MalformedRange(text.to_string()))?;
        if start > end {
            return Err(ScanError::InvalidRange { start, end });
        }
        Ok((start, end))
    }

    /// Number of candidates in the range, 0 when start > end.
    pub fn total(&self) -> u64 {
        let span = self.id_range_end as i128 - self.id_range_start as i128 + 1;
        if span <= 0 {
            0
        } else {
            u64::try_from(span).unwrap_or(u64::MAX)
        }
    }

    /// Reject bad input before any worker exists / 输入校验
    pub fn validate(&self, settings: &ScanSettings) -> Result<(), ScanError> {
        if self.name.trim().is_empty() {
            return Err(ScanError::EmptyName);
        }
        if self.id_range_start > self.id_range_end {
            return Err(ScanError::InvalidRange {
                start: self.id_range_start,
                end: self.id_range_end,
            });
        }
        let total = self.total();
        let max_candidates = settings.candidate_limit();
        if total > max_candidates {
            return Err(ScanError::RangeTooLarge { total, max: max_candidates });
        }
        let max_parallelism = settings.parallelism_limit();
        if self.parallelism == 0 || self.parallelism > max_parallelism {
            return Err(ScanError::InvalidParallelism {
                value: self.parallelism,
                max: max_parallelism,
            });
        }
        Ok(())
    }
}

/// Per-worker slot, written only by its own worker / 单个 worker 的状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerState {
    pub id: usize,
    pub status: WorkerStatus,
    pub current_candidate: Option<i64>,
    pub last_message: String,
}

impl WorkerState {
    pub fn idle(id: usize) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            current_candidate: None,
            last_message: String::new(),
        }
    }
}

/// Published snapshot of one run / 对外发布的运行状态快照
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunState {
    pub run_id: u64,
    pub running: bool,
    pub error: Option<String>,
    pub results: Vec<ScoreRecord>,
    /// (current, total)
    pub progress: Option<(u64, u64)>,
    pub found_count: usize,
    pub parallelism: usize,
    pub workers: Vec<WorkerState>,
    pub logs: LogBuffer,
    pub outcome: Option<ScanOutcome>,
}

impl RunState {
    /// Fresh idle state with `parallelism` idle worker slots.
    pub fn idle(run_id: u64, parallelism: usize, max_logs: usize) -> Self {
        Self {
            run_id,
            running: false,
            error: None,
            results: Vec::new(),
            progress: None,
            found_count: 0,
            parallelism,
            workers: (0..parallelism).map(WorkerState::idle).collect(),
            logs: LogBuffer::new(max_logs),
            outcome: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.running && self.outcome.is_some()
    }

    pub fn last_log(&self) -> Option<&LogLine> {
        self.logs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ScanSettings {
        ScanSettings::default()
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(SearchRequest::parse_range("4112440401-4112440410"), Ok((4112440401, 4112440410)));
        assert_eq!(SearchRequest::parse_range(" 7 - 7 "), Ok((7, 7)));
        assert_eq!(
            SearchRequest::parse_range("5000-10"),
            Err(ScanError::InvalidRange { start: 5000, end: 10 })
        );
        assert!(matches!(SearchRequest::parse_range("5000"), Err(ScanError::MalformedRange(_))));
        assert!(matches!(SearchRequest::parse_range("a-b"), Err(ScanError::MalformedRange(_))));
        assert!(matches!(SearchRequest::parse_range("1-2-3"), Err(ScanError::MalformedRange(_))));
    }

    #[test]
    fn test_validate() {
        let s = settings();
        assert!(SearchRequest::new("张三", 1000, 1009, 4).validate(&s).is_ok());
        assert!(SearchRequest::new("张三", 1, 10_000, 32).validate(&s).is_ok());

        assert_eq!(SearchRequest::new("  ", 1, 2, 4).validate(&s), Err(ScanError::EmptyName));
        assert_eq!(
            SearchRequest::new("a", 5000, 10, 4).validate(&s),
            Err(ScanError::InvalidRange { start: 5000, end: 10 })
        );
        assert_eq!(
            SearchRequest::new("a", 1, 10_001, 4).validate(&s),
            Err(ScanError::RangeTooLarge { total: 10_001, max: 10_000 })
        );
        assert_eq!(
            SearchRequest::new("a", 1, 2, 0).validate(&s),
            Err(ScanError::InvalidParallelism { value: 0, max: 32 })
        );
        assert_eq!(
            SearchRequest::new("a", 1, 2, 33).validate(&s),
            Err(ScanError::InvalidParallelism { value: 33, max: 32 })
        );
    }

    #[test]
    fn test_validate_caps_configured_limits() {
        let loose = ScanSettings {
            max_candidates: 1_000_000,
            max_parallelism: 256,
            ..ScanSettings::default()
        };
        assert_eq!(
            SearchRequest::new("a", 1, 50_000, 4).validate(&loose),
            Err(ScanError::RangeTooLarge { total: 50_000, max: 10_000 })
        );
        assert_eq!(
            SearchRequest::new("a", 1, 10, 100).validate(&loose),
            Err(ScanError::InvalidParallelism { value: 100, max: 32 })
        );
    }

    #[test]
    fn test_total_does_not_overflow() {
        let req = SearchRequest::new("a", i64::MIN, i64::MAX, 1);
        assert_eq!(req.total(), u64::MAX);
        assert!(matches!(req.validate(&settings()), Err(ScanError::RangeTooLarge { .. })));
    }

    #[test]
    fn test_idle_state() {
        let state = RunState::idle(3, 4, 200);
        assert_eq!(state.workers.len(), 4);
        assert!(state.workers.iter().all(|w| w.status == WorkerStatus::Idle));
        assert!(!state.running);
        assert!(!state.is_terminal());
    }
}
