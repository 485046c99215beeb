//! One scan run / 单次扫描会话
//!
//! A session owns everything a run needs (stop coordinator, aggregator, queue)
//! and is discarded when the run ends, so no run state outlives its run.

use std::sync::Arc;
use tokio::task::JoinSet;

use super::aggregator::Aggregator;
use super::control::StopCoordinator;
use super::models::SearchRequest;
use super::producer::{candidate_queue, produce, ProducerExit};
use super::types::{ScanOutcome, StopReason};
use super::worker::{run_worker, WorkerContext, WorkerExit};
use crate::config::ScanSettings;
use crate::lookup::ScoreLookup;

pub struct ScanSession {
    pub request: SearchRequest,
    pub control: Arc<StopCoordinator>,
    pub aggregator: Arc<Aggregator>,
}

impl ScanSession {
    pub fn new(request: SearchRequest, control: Arc<StopCoordinator>, aggregator: Arc<Aggregator>) -> Self {
        Self { request, control, aggregator }
    }

    /// Drive the run to its single terminal transition.
    pub async fn run(self, lookup: Arc<dyn ScoreLookup>, settings: ScanSettings) -> ScanOutcome {
        let run_id = self.aggregator.run_id();
        let parallelism = self.request.parallelism;
        let capacity = parallelism.saturating_mul(settings.queue_factor);

        let (tx, queue) = match candidate_queue(capacity) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!("run {} aborted: {}", run_id, e);
                let outcome = ScanOutcome::Fatal(e.to_string());
                self.aggregator.finalize(outcome.clone());
                return outcome;
            }
        };

        let name: Arc<str> = Arc::from(self.request.name.trim());
        let mut workers = JoinSet::new();
        for id in 0..parallelism {
            workers.spawn(run_worker(WorkerContext {
                id,
                name: name.clone(),
                lookup: lookup.clone(),
                queue: queue.clone(),
                control: self.control.clone(),
                aggregator: self.aggregator.clone(),
                lookup_timeout: settings.lookup_timeout(),
                status_interval: settings.worker_status_interval(),
            }));
        }
        // workers hold the only receivers from here on
        drop(queue);

        let producer = produce(
            tx,
            self.request.id_range_start,
            self.request.id_range_end,
            settings.progress_stride,
            self.control.clone(),
            self.aggregator.clone(),
        );
        let (producer_exit, (exits, fault)) = tokio::join!(producer, drain(&mut workers, &self.control));

        let queried: u64 = exits.iter().map(|e| e.queried).sum();
        let failures: u64 = exits.iter().map(|e| e.failures).sum();
        let winner = exits.iter().find(|e| e.won).map(|e| e.id);
        tracing::debug!(
            "run {} workers done: queried={}, failures={}, winner={:?}, producer={:?}",
            run_id, queried, failures, winner, producer_exit
        );
        for exit in exits.iter().filter(|e| !e.won) {
            tracing::trace!("run {} worker {} exited: {:?}", run_id, exit.id, exit.reason);
        }

        let fault_seen = fault.is_some();
        let outcome = if self.control.is_found() {
            ScanOutcome::Success
        } else if let Some(message) = fault {
            ScanOutcome::Fatal(message)
        } else if self.control.is_user_cancelled() {
            ScanOutcome::UserCancelled
        } else if producer_exit == ProducerExit::Exhausted {
            ScanOutcome::Exhausted
        } else {
            ScanOutcome::Fatal("producer stopped before the range was consumed".to_string())
        };

        // crashed workers never reported their own stop
        let reason = if fault_seen {
            StopReason::Fault
        } else {
            self.control.stop_reason()
        };
        self.aggregator.stop_unfinished(reason.message());

        if let ScanOutcome::Fatal(message) = &outcome {
            tracing::error!("run {} failed: {}", run_id, message);
        } else {
            tracing::info!("run {} finished: {:?}", run_id, outcome);
        }
        self.aggregator.finalize(outcome.clone());
        outcome
    }
}

/// Join every worker; a crashed worker halts the whole run.
async fn drain(
    workers: &mut JoinSet<WorkerExit>,
    control: &StopCoordinator,
) -> (Vec<WorkerExit>, Option<String>) {
    let mut exits = Vec::new();
    let mut fault = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(exit) => exits.push(exit),
            Err(e) => {
                if fault.is_none() {
                    fault = Some(format!("worker task failed: {}", e));
                }
                control.fault();
            }
        }
    }
    (exits, fault)
}
