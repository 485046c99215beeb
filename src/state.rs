use score_scan::scan::ScanManager;
use std::sync::Arc;

/// Shared handler state / 共享状态
pub struct AppState {
    pub scan: Arc<ScanManager>,
}
