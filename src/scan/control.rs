//! Stop coordinator / 停止协调器
//!
//! One atomic phase word decides the run's fate: it moves away from `OPEN`
//! exactly once, to `FOUND` (a worker claimed the first hit), `CANCELLED`
//! (user stop / supersession) or `FAULTED` (a worker task crashed). Because both transitions are CAS on
//! the same word, a hit racing a user cancel has exactly one winner, and a
//! result that arrives after a cancel can never be claimed.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

use super::types::StopReason;

const OPEN: u8 = 0;
const FOUND: u8 = 1;
const CANCELLED: u8 = 2;
const FAULTED: u8 = 3;

#[derive(Debug)]
pub struct StopCoordinator {
    phase: AtomicU8,
    token: CancellationToken,
}

impl StopCoordinator {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(OPEN),
            token: CancellationToken::new(),
        }
    }

    /// First-hit claim; true for exactly one caller per run / 抢占命中
    pub fn try_claim_found(&self) -> bool {
        self.phase
            .compare_exchange(OPEN, FOUND, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// User-initiated stop; never sets "found" / 用户停止
    ///
    /// Returns false when the run had already been decided by a hit.
    pub fn request_cancel(&self) -> bool {
        let cancelled = self.phase
            .compare_exchange(OPEN, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.token.cancel();
        cancelled
    }

    /// Orchestration fault; stops the run unless a hit already decided it / 故障停止
    pub fn fault(&self) -> bool {
        let faulted = self.phase
            .compare_exchange(OPEN, FAULTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.token.cancel();
        faulted
    }

    /// Wake every producer/worker suspended on the queue or a lookup.
    pub fn halt(&self) {
        self.token.cancel();
    }

    pub fn is_found(&self) -> bool {
        self.phase.load(Ordering::Acquire) == FOUND
    }

    pub fn is_user_cancelled(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_stop_requested(&self) -> bool {
        self.phase.load(Ordering::Acquire) != OPEN || self.token.is_cancelled()
    }

    /// Resolves once a stop has been signalled.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    pub fn stop_reason(&self) -> StopReason {
        match self.phase.load(Ordering::Acquire) {
            FOUND => StopReason::Hit,
            CANCELLED => StopReason::UserCancel,
            FAULTED => StopReason::Fault,
            _ => StopReason::Exhausted,
        }
    }
}

impl Default for StopCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
