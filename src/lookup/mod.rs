//! Remote lookup contract / 远程查询接口
//!
//! The scan engine only ever calls [`ScoreLookup::query_by_identity`]; how the
//! records are fetched is up to the implementation.

mod client;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::ScoreRecord;

pub use client::HttpScoreLookup;

/// Per-candidate lookup failure / 单个候选查询失败
///
/// Never escapes a worker: it is logged against the candidate and the worker moves on.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Query records by (name, identifier) / 按姓名+学号查询成绩
#[async_trait]
pub trait ScoreLookup: Send + Sync {
    /// Returns zero or more records; an empty list means "no match".
    async fn query_by_identity(&self, name: &str, id: &str) -> Result<Vec<ScoreRecord>, LookupError>;
}
