//! Scan manager / 扫描管理器
//!
//! The surface a host (UI, HTTP API) talks to: start, cancel, resize the pool,
//! and observe [`RunState`] snapshots. Each `start_scan` builds a fresh
//! [`ScanSession`]; a still-running session is cancelled and awaited first.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::aggregator::Aggregator;
use super::control::StopCoordinator;
use super::error::ScanError;
use super::log::{LogLine, SYSTEM_WORKER};
use super::models::{RunState, SearchRequest};
use super::session::ScanSession;
use super::types::{LogLevel, ScanOutcome};
use crate::config::ScanSettings;
use crate::lookup::ScoreLookup;

struct ActiveRun {
    run_id: u64,
    control: Arc<StopCoordinator>,
    aggregator: Arc<Aggregator>,
    handle: JoinHandle<ScanOutcome>,
}

pub struct ScanManager {
    lookup: Arc<dyn ScoreLookup>,
    settings: ScanSettings,
    state_tx: Arc<watch::Sender<RunState>>,
    parallelism: AtomicUsize,
    next_run_id: AtomicU64,
    active: Mutex<Option<ActiveRun>>,
    // serialises start / resize / clear so only one session is ever live
    restart_lock: tokio::sync::Mutex<()>,
}

impl ScanManager {
    pub fn new(lookup: Arc<dyn ScoreLookup>, settings: ScanSettings) -> Self {
        let parallelism = settings
            .default_parallelism
            .clamp(1, settings.parallelism_limit());
        let (state_tx, _) = watch::channel(RunState::idle(0, parallelism, settings.max_logs));
        Self {
            lookup,
            settings,
            state_tx: Arc::new(state_tx),
            parallelism: AtomicUsize::new(parallelism),
            next_run_id: AtomicU64::new(1),
            active: Mutex::new(None),
            restart_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Observable state stream / 状态订阅
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> RunState {
        self.state_tx.borrow().clone()
    }

    /// Pool size used when `start_scan` is not given one.
    pub fn parallelism(&self) -> usize {
        self.parallelism.load(Ordering::SeqCst)
    }

    /// Start a scan over `id_range_start..=id_range_end` / 开始扫描
    ///
    /// Input is validated before anything else happens; on rejection no
    /// session is created and no lookup is made. A running scan is cancelled
    /// and awaited, then the new run starts in the background and its id is
    /// returned.
    pub async fn start_scan(
        &self,
        name: &str,
        id_range_start: i64,
        id_range_end: i64,
        parallelism: Option<usize>,
    ) -> Result<u64, ScanError> {
        let request = SearchRequest::new(
            name.trim(),
            id_range_start,
            id_range_end,
            parallelism.unwrap_or_else(|| self.parallelism()),
        );
        if let Err(e) = request.validate(&self.settings) {
            self.publish_rejection(&e);
            return Err(e);
        }

        let _guard = self.restart_lock.lock().await;
        self.stop_active().await;

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let control = Arc::new(StopCoordinator::new());
        let aggregator = Arc::new(Aggregator::begin(
            run_id,
            self.state_tx.clone(),
            &request,
            self.settings.max_logs,
        ));
        tracing::info!(
            "run {} started: range={}-{}, parallelism={}",
            run_id, request.id_range_start, request.id_range_end, request.parallelism
        );

        let session = ScanSession::new(request, control.clone(), aggregator.clone());
        let handle = tokio::spawn(session.run(self.lookup.clone(), self.settings.clone()));

        *self.active.lock() = Some(ActiveRun {
            run_id,
            control,
            aggregator,
            handle,
        });
        Ok(run_id)
    }

    /// Same as [`ScanManager::start_scan`] with a textual `start-end` range.
    pub async fn start_scan_range(
        &self,
        name: &str,
        range: &str,
        parallelism: Option<usize>,
    ) -> Result<u64, ScanError> {
        let (start, end) = match SearchRequest::parse_range(range) {
            Ok(bounds) => bounds,
            Err(e) => {
                self.publish_rejection(&e);
                return Err(e);
            }
        };
        self.start_scan(name, start, end, parallelism).await
    }

    /// Cooperative stop of the running scan / 停止扫描
    ///
    /// Returns false when nothing was running.
    pub fn cancel_scan(&self) -> bool {
        let active = self.active.lock();
        let Some(run) = active.as_ref() else {
            return false;
        };
        let delivered = run.aggregator.request_user_stop(&run.control);
        tracing::info!("run {} cancel requested (accepted={})", run.run_id, delivered);
        delivered
    }

    /// Resize the pool for the next run; cancels a running scan first / 修改并发数
    pub async fn update_parallelism(&self, parallelism: usize) -> Result<(), ScanError> {
        let max = self.settings.parallelism_limit();
        if parallelism == 0 || parallelism > max {
            return Err(ScanError::InvalidParallelism {
                value: parallelism,
                max,
            });
        }

        let _guard = self.restart_lock.lock().await;
        self.stop_active().await;
        self.parallelism.store(parallelism, Ordering::SeqCst);

        let mut state = self.fresh_idle_state();
        state.logs.push(LogLine::now(
            SYSTEM_WORKER,
            LogLevel::Info,
            format!("parallelism set to {}", parallelism),
        ));
        self.state_tx.send_replace(state);
        tracing::info!("parallelism updated to {}", parallelism);
        Ok(())
    }

    /// Cancel any run and reset to an empty idle state / 清空
    pub async fn clear(&self) {
        let _guard = self.restart_lock.lock().await;
        self.stop_active().await;
        self.state_tx.send_replace(self.fresh_idle_state());
    }

    pub fn clear_error(&self) {
        self.state_tx.send_if_modified(|state| state.error.take().is_some());
    }

    /// Stop the running scan, if any, and wait for it.
    pub async fn shutdown(&self) {
        let _guard = self.restart_lock.lock().await;
        self.stop_active().await;
    }

    /// Wait until run `run_id` has published its terminal state.
    pub async fn wait_terminal(&self, run_id: u64) -> Result<RunState, ScanError> {
        let mut rx = self.subscribe();
        let state = rx
            .wait_for(|state| state.run_id != run_id || state.is_terminal())
            .await
            .map_err(|e| ScanError::Orchestration(e.to_string()))?;
        Ok(state.clone())
    }

    fn fresh_idle_state(&self) -> RunState {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        RunState::idle(run_id, self.parallelism(), self.settings.max_logs)
    }

    /// Rejected input is shown to an idle observer; a running scan is left untouched.
    fn publish_rejection(&self, error: &ScanError) {
        tracing::warn!("scan request rejected: {}", error);
        let message = error.to_string();
        self.state_tx.send_if_modified(|state| {
            if state.running {
                return false;
            }
            state.error = Some(message);
            true
        });
    }

    /// Cancel the live session and wait (bounded) for it to finish.
    async fn stop_active(&self) {
        let previous = self.active.lock().take();
        let Some(run) = previous else {
            return;
        };

        if !run.handle.is_finished() {
            run.control.request_cancel();
        }
        let mut handle = run.handle;
        match tokio::time::timeout(self.settings.stop_grace(), &mut handle).await {
            Ok(Ok(outcome)) => {
                tracing::debug!("run {} stopped: {:?}", run.run_id, outcome);
            }
            Ok(Err(e)) => {
                tracing::warn!("run {} task failed: {}", run.run_id, e);
            }
            Err(_) => {
                tracing::warn!(
                    "run {} did not stop within {:?}, aborting",
                    run.run_id,
                    self.settings.stop_grace()
                );
                handle.abort();
            }
        }
        run.aggregator.seal();
    }
}
