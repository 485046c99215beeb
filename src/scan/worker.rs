//! Worker loop / 工作协程
//!
//! Each worker drains the shared queue, queries the remote service for each
//! candidate, and races the others for the first-hit claim.

use std::sync::Arc;
use std::time::Duration;

use super::aggregator::Aggregator;
use super::control::StopCoordinator;
use super::log::Throttle;
use super::producer::CandidateQueue;
use super::types::{LogLevel, StopReason, WorkerStatus};
use crate::lookup::{LookupError, ScoreLookup};

pub struct WorkerContext {
    pub id: usize,
    pub name: Arc<str>,
    pub lookup: Arc<dyn ScoreLookup>,
    pub queue: CandidateQueue,
    pub control: Arc<StopCoordinator>,
    pub aggregator: Arc<Aggregator>,
    pub lookup_timeout: Duration,
    pub status_interval: Duration,
}

/// Worker summary returned to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub id: usize,
    pub queried: u64,
    pub failures: u64,
    pub won: bool,
    pub reason: StopReason,
}

pub async fn run_worker(ctx: WorkerContext) -> WorkerExit {
    let WorkerContext {
        id,
        name,
        lookup,
        queue,
        control,
        aggregator,
        lookup_timeout,
        status_interval,
    } = ctx;
    let log_id = id as i32;
    let mut throttle = Throttle::new(status_interval);
    let mut queried = 0u64;
    let mut failures = 0u64;
    let mut won = false;

    aggregator.log(log_id, LogLevel::Info, "worker online");

    loop {
        let candidate = tokio::select! {
            biased;
            _ = control.stopped() => break,
            next = queue.recv() => match next {
                Some(candidate) => candidate,
                None => break,
            },
        };
        if control.is_stop_requested() {
            break;
        }

        if throttle.ready() {
            aggregator.set_worker(id, WorkerStatus::Running, Some(candidate), "running");
        }

        let candidate_text = candidate.to_string();
        let outcome = tokio::select! {
            biased;
            // 已停止：放弃在途请求，结果不再合并
            _ = control.stopped() => break,
            res = tokio::time::timeout(lookup_timeout, lookup.query_by_identity(&name, &candidate_text)) => {
                res.unwrap_or(Err(LookupError::Timeout(lookup_timeout)))
            }
        };
        queried += 1;

        let records = match outcome {
            Ok(records) => records,
            Err(e) => {
                failures += 1;
                aggregator.set_worker(id, WorkerStatus::Fail, Some(candidate), "fail");
                aggregator.log(log_id, LogLevel::Err, format!("id={} {}", candidate, e));
                continue;
            }
        };
        if records.is_empty() {
            continue;
        }

        // Late results (stop already requested) are discarded, never claimed.
        if control.is_stop_requested() || !control.try_claim_found() {
            tracing::debug!("worker {} discarded late hit for {}", id, candidate);
            break;
        }

        won = true;
        let hits = records.len();
        aggregator.merge_hit(records);
        aggregator.set_worker(id, WorkerStatus::Success, Some(candidate), &format!("HIT({})", hits));
        aggregator.log(log_id, LogLevel::Ok, format!("id={} hit {} record(s)", candidate, hits));
        control.halt();
        queue.close().await;
        break;
    }

    let reason = if control.is_stop_requested() {
        control.stop_reason()
    } else {
        StopReason::Exhausted
    };
    if !won {
        aggregator.set_worker(id, WorkerStatus::Stopped, None, reason.message());
    }

    WorkerExit {
        id,
        queried,
        failures,
        won,
        reason,
    }
}
