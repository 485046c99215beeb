use thiserror::Error;

/// Scan errors / 扫描错误
///
/// Everything except [`ScanError::Orchestration`] is an input rejection: it is
/// returned before any worker starts or any lookup is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("student name is required")]
    EmptyName,
    #[error("malformed range {0:?}, expected <start>-<end>")]
    MalformedRange(String),
    #[error("invalid range: start {start} is greater than end {end}")]
    InvalidRange { start: i64, end: i64 },
    #[error("range too large ({total}), keep it within {max}")]
    RangeTooLarge { total: u64, max: u64 },
    #[error("parallelism {value} out of range 1..={max}")]
    InvalidParallelism { value: usize, max: usize },
    #[error("scan aborted: {0}")]
    Orchestration(String),
}

impl ScanError {
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, ScanError::Orchestration(_))
    }
}
