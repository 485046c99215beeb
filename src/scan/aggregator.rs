//! Result aggregator / 结果汇总
//!
//! The single writer of a run's published [`RunState`]. Every mutation goes
//! through the watch channel's write lock, so concurrent reports from the
//! producer and the workers are applied one at a time. After [`Aggregator::finalize`]
//! or [`Aggregator::seal`] the aggregator rejects every further report.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::control::StopCoordinator;
use super::log::{LogLine, SYSTEM_WORKER};
use super::models::{RunState, SearchRequest};
use super::types::{LogLevel, ScanOutcome, WorkerStatus};
use crate::models::ScoreRecord;

pub struct Aggregator {
    run_id: u64,
    state_tx: Arc<watch::Sender<RunState>>,
    sealed: AtomicBool,
    merged: AtomicBool,
}

impl Aggregator {
    /// Replace the published state with a fresh running state for `request`.
    pub fn begin(
        run_id: u64,
        state_tx: Arc<watch::Sender<RunState>>,
        request: &SearchRequest,
        max_logs: usize,
    ) -> Self {
        let mut state = RunState::idle(run_id, request.parallelism, max_logs);
        state.running = true;
        state.progress = Some((0, request.total()));
        state.logs.push(LogLine::now(
            SYSTEM_WORKER,
            LogLevel::Info,
            format!(
                "start scan name={}, range={}-{}, threads={}",
                request.name, request.id_range_start, request.id_range_end, request.parallelism
            ),
        ));
        state_tx.send_replace(state);

        Self {
            run_id,
            state_tx,
            sealed: AtomicBool::new(false),
            merged: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Apply `f` unless the run is sealed or has been superseded; returns whether it ran.
    fn update(&self, f: impl FnOnce(&mut RunState)) -> bool {
        if self.sealed.load(Ordering::Acquire) {
            return false;
        }
        self.state_tx.send_if_modified(|state| {
            if self.sealed.load(Ordering::Acquire) || state.run_id != self.run_id {
                return false;
            }
            f(state);
            true
        })
    }

    pub fn log(&self, worker_id: i32, level: LogLevel, message: impl Into<String>) {
        let line = LogLine::now(worker_id, level, message);
        self.update(|state| state.logs.push(line));
    }

    /// Update one worker slot; `candidate = None` keeps the previous candidate.
    pub fn set_worker(&self, worker_id: usize, status: WorkerStatus, candidate: Option<i64>, message: &str) {
        self.update(|state| {
            if let Some(slot) = state.workers.get_mut(worker_id) {
                slot.status = status;
                if candidate.is_some() {
                    slot.current_candidate = candidate;
                }
                slot.last_message = message.to_string();
            }
        });
    }

    pub fn progress(&self, current: u64, total: u64) {
        self.update(|state| state.progress = Some((current, total)));
    }

    /// Deliver a user stop and log what happened to it / 用户停止请求
    ///
    /// The cancel is attempted under the state lock, so the log line always
    /// precedes the terminal one. A run already decided by a hit (or already
    /// finished) is left as it is.
    pub fn request_user_stop(&self, control: &StopCoordinator) -> bool {
        let mut delivered = false;
        self.update(|state| {
            delivered = control.request_cancel();
            let message = if delivered {
                "stop requested by user"
            } else {
                "cancel ignored: run already decided"
            };
            state.logs.push(LogLine::now(SYSTEM_WORKER, LogLevel::Info, message));
        });
        delivered
    }

    /// Mark every slot that never reported a final status as stopped.
    pub fn stop_unfinished(&self, message: &str) {
        self.update(|state| {
            for slot in state.workers.iter_mut() {
                if !matches!(slot.status, WorkerStatus::Stopped | WorkerStatus::Success) {
                    slot.status = WorkerStatus::Stopped;
                    slot.last_message = message.to_string();
                }
            }
        });
    }

    /// Merge the winning worker's records; only the first call per run has effect.
    ///
    /// Returns the deduplicated result count, or `None` if a merge already happened.
    pub fn merge_hit(&self, records: Vec<ScoreRecord>) -> Option<usize> {
        if self.merged.swap(true, Ordering::AcqRel) {
            return None;
        }
        let results = dedup_records(records);
        let count = results.len();
        self.update(|state| {
            state.found_count = count;
            state.results = results;
        });
        Some(count)
    }

    /// Terminal transition; seals the aggregator / 终态
    pub fn finalize(&self, outcome: ScanOutcome) -> bool {
        if self.sealed.load(Ordering::Acquire) {
            return false;
        }
        let summary = match &outcome {
            ScanOutcome::Success => LogLine::now(SYSTEM_WORKER, LogLevel::Ok, "hit found, all workers stopped"),
            ScanOutcome::Exhausted => LogLine::now(SYSTEM_WORKER, LogLevel::Info, "scan finished: no match"),
            ScanOutcome::UserCancelled => LogLine::now(SYSTEM_WORKER, LogLevel::Info, "scan stopped by user"),
            ScanOutcome::Fatal(message) => {
                LogLine::now(SYSTEM_WORKER, LogLevel::Err, format!("scan failed: {}", message))
            }
        };

        self.state_tx.send_if_modified(|state| {
            if self.sealed.swap(true, Ordering::AcqRel) || state.run_id != self.run_id {
                return false;
            }
            state.running = false;
            state.error = outcome.error_text();
            if outcome != ScanOutcome::Success {
                state.results.clear();
            }
            state.found_count = state.results.len();
            state.logs.push(summary);
            state.outcome = Some(outcome);
            true
        })
    }

    /// Reject all further reports without publishing anything.
    pub fn seal(&self) {
        self.state_tx.send_if_modified(|_| {
            self.sealed.store(true, Ordering::Release);
            false
        });
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}

/// Drop repeated (student_num, exam_name, course, score) tuples, keeping first occurrence / 去重
pub fn dedup_records(records: Vec<ScoreRecord>) -> Vec<ScoreRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(num: &str, course: &str, score: &str) -> ScoreRecord {
        ScoreRecord {
            exam_name: Some("期末".to_string()),
            course: Some(course.to_string()),
            score: Some(score.to_string()),
            student_num: Some(num.to_string()),
            ..Default::default()
        }
    }

    fn setup(parallelism: usize) -> (Arc<watch::Sender<RunState>>, Aggregator) {
        let (tx, _rx) = watch::channel(RunState::idle(0, parallelism, 200));
        let tx = Arc::new(tx);
        let request = SearchRequest::new("张三", 1000, 1009, parallelism);
        let aggregator = Aggregator::begin(1, tx.clone(), &request, 200);
        (tx, aggregator)
    }

    #[test]
    fn test_dedup_by_identity_tuple() {
        let mut dup = record("1005", "Math", "90");
        dup.search_timestamp = Some("later".to_string());
        let records = vec![record("1005", "Math", "90"), dup, record("1005", "English", "88")];
        let results = dedup_records(records);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].course.as_deref(), Some("Math"));
        assert!(results[0].search_timestamp.is_none());
    }

    #[test]
    fn test_begin_publishes_running_state() {
        let (tx, _aggregator) = setup(4);
        let state = tx.borrow().clone();
        assert!(state.running);
        assert_eq!(state.run_id, 1);
        assert_eq!(state.progress, Some((0, 10)));
        assert_eq!(state.workers.len(), 4);
        assert!(state.last_log().unwrap().message.contains("threads=4"));
    }

    #[test]
    fn test_merge_happens_once() {
        let (tx, aggregator) = setup(2);
        assert_eq!(aggregator.merge_hit(vec![record("1005", "Math", "90")]), Some(1));
        assert_eq!(aggregator.merge_hit(vec![record("1006", "Math", "70")]), None);

        assert!(aggregator.finalize(ScanOutcome::Success));
        let state = tx.borrow().clone();
        assert!(!state.running);
        assert_eq!(state.error, None);
        assert_eq!(state.found_count, 1);
        assert_eq!(state.results[0].student_num.as_deref(), Some("1005"));
    }

    #[test]
    fn test_exhausted_sets_not_found() {
        let (tx, aggregator) = setup(2);
        aggregator.progress(10, 10);
        aggregator.finalize(ScanOutcome::Exhausted);
        let state = tx.borrow().clone();
        assert_eq!(state.error.as_deref(), Some("not found"));
        assert!(state.results.is_empty());
        assert_eq!(state.progress, Some((10, 10)));
        assert_eq!(state.outcome, Some(ScanOutcome::Exhausted));
    }

    #[test]
    fn test_no_mutation_after_finalize() {
        let (tx, aggregator) = setup(2);
        aggregator.finalize(ScanOutcome::UserCancelled);
        let frozen = tx.borrow().clone();
        assert_eq!(frozen.error, None);

        assert!(!aggregator.finalize(ScanOutcome::Exhausted));
        aggregator.log(0, LogLevel::Info, "late");
        aggregator.set_worker(0, WorkerStatus::Running, Some(1001), "running");
        aggregator.progress(5, 10);
        assert_eq!(*tx.borrow(), frozen);
    }

    #[test]
    fn test_superseded_run_cannot_write() {
        let (tx, old) = setup(2);
        let request = SearchRequest::new("李四", 1, 3, 1);
        let _new = Aggregator::begin(2, tx.clone(), &request, 200);
        old.log(0, LogLevel::Err, "stale");
        old.set_worker(1, WorkerStatus::Fail, Some(9), "fail");
        let state = tx.borrow().clone();
        assert_eq!(state.run_id, 2);
        assert_eq!(state.workers.len(), 1);
        assert!(state.logs.iter().all(|l| l.message != "stale"));
    }

    #[test]
    fn test_user_stop_is_logged_only_when_delivered() {
        let (tx, aggregator) = setup(2);
        let control = StopCoordinator::new();
        assert!(aggregator.request_user_stop(&control));
        assert!(control.is_user_cancelled());
        assert_eq!(tx.borrow().last_log().unwrap().message, "stop requested by user");
    }

    #[test]
    fn test_user_stop_after_hit_is_ignored() {
        let (tx, aggregator) = setup(2);
        let control = StopCoordinator::new();
        assert!(control.try_claim_found());

        assert!(!aggregator.request_user_stop(&control));
        assert!(control.is_found());
        let state = tx.borrow().clone();
        assert!(state.logs.iter().all(|l| l.message != "stop requested by user"));
        assert_eq!(state.last_log().unwrap().message, "cancel ignored: run already decided");
    }

    #[test]
    fn test_user_stop_after_finalize_does_nothing() {
        let (tx, aggregator) = setup(2);
        let control = StopCoordinator::new();
        aggregator.finalize(ScanOutcome::Exhausted);
        let frozen = tx.borrow().clone();

        assert!(!aggregator.request_user_stop(&control));
        assert!(!control.is_stop_requested());
        assert_eq!(*tx.borrow(), frozen);
    }

    #[test]
    fn test_stop_unfinished_leaves_final_slots() {
        let (tx, aggregator) = setup(3);
        aggregator.set_worker(0, WorkerStatus::Success, Some(1005), "HIT(1)");
        aggregator.set_worker(1, WorkerStatus::Running, Some(1006), "running");
        aggregator.stop_unfinished("stopped by fault");

        let state = tx.borrow().clone();
        assert_eq!(state.workers[0].status, WorkerStatus::Success);
        assert_eq!(state.workers[1].status, WorkerStatus::Stopped);
        assert_eq!(state.workers[1].last_message, "stopped by fault");
        assert_eq!(state.workers[1].current_candidate, Some(1006));
        assert_eq!(state.workers[2].status, WorkerStatus::Stopped);
    }

    #[test]
    fn test_set_worker_keeps_candidate() {
        let (tx, aggregator) = setup(2);
        aggregator.set_worker(1, WorkerStatus::Running, Some(1003), "running");
        aggregator.set_worker(1, WorkerStatus::Stopped, None, "queue exhausted");
        let state = tx.borrow().clone();
        assert_eq!(state.workers[1].current_candidate, Some(1003));
        assert_eq!(state.workers[1].status, WorkerStatus::Stopped);
        assert_eq!(state.workers[0].status, WorkerStatus::Idle);
    }
}
