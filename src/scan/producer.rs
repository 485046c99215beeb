//! Candidate queue and range producer / 候选队列与生产者

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use super::aggregator::Aggregator;
use super::control::StopCoordinator;
use super::error::ScanError;

/// Shared receiving end of the bounded candidate queue / 多消费者共享的接收端
///
/// Receiving returns `None` once the producer has dropped its sender and the
/// queue is drained, or after [`CandidateQueue::close`].
#[derive(Clone)]
pub struct CandidateQueue {
    rx: Arc<Mutex<mpsc::Receiver<i64>>>,
}

impl CandidateQueue {
    pub async fn recv(&self) -> Option<i64> {
        self.rx.lock().await.recv().await
    }

    /// Refuse further sends; already queued items can still be drained.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}

/// Create the bounded queue; a zero capacity is an orchestration fault / 创建有界队列
pub fn candidate_queue(capacity: usize) -> Result<(mpsc::Sender<i64>, CandidateQueue), ScanError> {
    if capacity == 0 {
        return Err(ScanError::Orchestration("queue setup failed: capacity is 0".to_string()));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((tx, CandidateQueue { rx: Arc::new(Mutex::new(rx)) }))
}

/// How the producer left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Every candidate was enqueued.
    Exhausted,
    /// Stop signal seen or every receiver gone.
    Stopped { enqueued: u64 },
}

/// Enumerate `start..=end` ascending into the queue / 按升序投递候选
///
/// Progress is published every `stride` items (0 disables intermediate
/// updates) and `(total, total)` exactly once on normal exhaustion. Dropping
/// `tx` on return closes the queue.
pub async fn produce(
    tx: mpsc::Sender<i64>,
    start: i64,
    end: i64,
    stride: u64,
    control: Arc<StopCoordinator>,
    aggregator: Arc<Aggregator>,
) -> ProducerExit {
    let total = (end as i128 - start as i128 + 1).max(0) as u64;
    let mut enqueued = 0u64;

    for candidate in start..=end {
        if control.is_stop_requested() {
            return ProducerExit::Stopped { enqueued };
        }

        // 队列满时在此挂起（背压），取消信号可唤醒
        let sent = tokio::select! {
            biased;
            _ = control.stopped() => false,
            res = tx.send(candidate) => res.is_ok(),
        };
        if !sent {
            return ProducerExit::Stopped { enqueued };
        }
        enqueued += 1;

        if control.is_stop_requested() {
            return ProducerExit::Stopped { enqueued };
        }
        if stride > 0 && enqueued % stride == 0 && enqueued < total {
            aggregator.progress(enqueued, total);
        }
    }

    aggregator.progress(total, total);
    tracing::debug!("run {} producer enqueued {} candidates", aggregator.run_id(), total);
    ProducerExit::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::models::{RunState, SearchRequest};
    use tokio::sync::watch;

    fn aggregator_for(start: i64, end: i64) -> (Arc<watch::Sender<RunState>>, Arc<Aggregator>) {
        let (tx, _rx) = watch::channel(RunState::idle(0, 1, 50));
        let tx = Arc::new(tx);
        let request = SearchRequest::new("a", start, end, 1);
        let aggregator = Arc::new(Aggregator::begin(1, tx.clone(), &request, 50));
        (tx, aggregator)
    }

    #[test]
    fn test_zero_capacity_is_fatal() {
        assert!(matches!(candidate_queue(0), Err(ScanError::Orchestration(_))));
    }

    #[tokio::test]
    async fn test_produces_ascending_and_flushes_final_progress() {
        let (state_tx, aggregator) = aggregator_for(10, 19);
        let control = Arc::new(StopCoordinator::new());
        let (tx, queue) = candidate_queue(4).unwrap();

        let producer = tokio::spawn(produce(tx, 10, 19, 3, control, aggregator));
        let mut seen = Vec::new();
        while let Some(candidate) = queue.recv().await {
            seen.push(candidate);
        }
        assert_eq!(producer.await.unwrap(), ProducerExit::Exhausted);
        assert_eq!(seen, (10..=19).collect::<Vec<_>>());
        assert_eq!(state_tx.borrow().progress, Some((10, 10)));
    }

    #[tokio::test]
    async fn test_backpressure_then_stop() {
        let (state_tx, aggregator) = aggregator_for(1, 100);
        let control = Arc::new(StopCoordinator::new());
        let (tx, queue) = candidate_queue(2).unwrap();

        let producer = tokio::spawn(produce(tx, 1, 100, 50, control.clone(), aggregator));
        // Nobody drains: the producer parks on the full queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        control.request_cancel();
        let exit = producer.await.unwrap();
        assert_eq!(exit, ProducerExit::Stopped { enqueued: 2 });
        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, Some(2));
        assert_eq!(queue.recv().await, None);
        // no final flush on early stop
        assert_eq!(state_tx.borrow().progress, Some((0, 100)));
    }

    #[tokio::test]
    async fn test_closed_queue_stops_producer() {
        let (_state_tx, aggregator) = aggregator_for(1, 10);
        let control = Arc::new(StopCoordinator::new());
        let (tx, queue) = candidate_queue(1).unwrap();
        queue.close().await;

        let exit = produce(tx, 1, 10, 5, control, aggregator).await;
        assert_eq!(exit, ProducerExit::Stopped { enqueued: 0 });
    }
}
