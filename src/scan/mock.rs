//! Scripted lookup used by the engine tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::lookup::{LookupError, ScoreLookup};
use crate::models::ScoreRecord;

pub fn record_for(id: i64, course: &str, score: &str) -> ScoreRecord {
    ScoreRecord {
        exam_name: Some("期末考试".to_string()),
        course: Some(course.to_string()),
        score: Some(score.to_string()),
        student_name: Some("张三".to_string()),
        student_num: Some(id.to_string()),
        search_timestamp: Some("2024-01-11 08:00:00".to_string()),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MockLookup {
    hits: HashMap<i64, Vec<ScoreRecord>>,
    hit_all: bool,
    failures: HashSet<i64>,
    hangs: HashSet<i64>,
    panics: HashSet<i64>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(mut self, id: i64, records: Vec<ScoreRecord>) -> Self {
        self.hits.insert(id, records);
        self
    }

    /// Every candidate returns one record carrying its own id.
    pub fn hit_all(mut self) -> Self {
        self.hit_all = true;
        self
    }

    pub fn fail(mut self, id: i64) -> Self {
        self.failures.insert(id);
        self
    }

    pub fn hang(mut self, id: i64) -> Self {
        self.hangs.insert(id);
        self
    }

    pub fn panic_on(mut self, id: i64) -> Self {
        self.panics.insert(id);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreLookup for MockLookup {
    async fn query_by_identity(&self, _name: &str, id: &str) -> Result<Vec<ScoreRecord>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id: i64 = id.parse().map_err(|_| LookupError::Decode(format!("bad id {}", id)))?;

        if self.hangs.contains(&id) {
            futures::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics.contains(&id) {
            panic!("lookup exploded on {}", id);
        }
        if self.failures.contains(&id) {
            return Err(LookupError::Status(502));
        }
        if self.hit_all {
            return Ok(vec![record_for(id, "Math", "90")]);
        }
        Ok(self.hits.get(&id).cloned().unwrap_or_default())
    }
}
