//! Scan API / 扫描接口
//!
//! Thin HTTP/WebSocket layer over [`ScanManager`]; every operation answers
//! with the usual `{code, message, data}` envelope.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use super::ApiResponse;
use crate::state::AppState;
use score_scan::scan::{RunState, ScanError};

/// 开始扫描请求
///
/// Either `range` ("start-end") or both `start` and `end` must be given.
#[derive(Debug, Deserialize)]
pub struct StartScanReq {
    pub name: String,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub parallelism: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StartScanResp {
    pub run_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ParallelismReq {
    pub parallelism: usize,
}

/// POST /api/scan/start - 开始扫描
pub async fn start_scan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartScanReq>,
) -> Json<ApiResponse<StartScanResp>> {
    let result = match (req.range.as_deref(), req.start, req.end) {
        (Some(range), _, _) => state.scan.start_scan_range(&req.name, range, req.parallelism).await,
        (None, Some(start), Some(end)) => {
            state.scan.start_scan(&req.name, start, end, req.parallelism).await
        }
        _ => Err(ScanError::MalformedRange(String::new())),
    };

    match result {
        Ok(run_id) => Json(ApiResponse::success(StartScanResp { run_id })),
        Err(e) => Json(ApiResponse::error(&e.to_string())),
    }
}

/// POST /api/scan/cancel - 停止扫描
pub async fn cancel_scan(State(state): State<Arc<AppState>>) -> Json<ApiResponse<bool>> {
    if state.scan.cancel_scan() {
        Json(ApiResponse::success(true))
    } else {
        Json(ApiResponse::error("没有正在运行的扫描"))
    }
}

/// POST /api/scan/parallelism - 修改并发数
pub async fn update_parallelism(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ParallelismReq>,
) -> Json<ApiResponse<usize>> {
    match state.scan.update_parallelism(req.parallelism).await {
        Ok(()) => Json(ApiResponse::success(req.parallelism)),
        Err(e) => Json(ApiResponse::error(&e.to_string())),
    }
}

/// POST /api/scan/clear - 清空状态
pub async fn clear(State(state): State<Arc<AppState>>) -> Json<ApiResponse<RunState>> {
    state.scan.clear().await;
    Json(ApiResponse::success(state.scan.snapshot()))
}

/// POST /api/scan/clear_error
pub async fn clear_error(State(state): State<Arc<AppState>>) -> Json<ApiResponse<RunState>> {
    state.scan.clear_error();
    Json(ApiResponse::success(state.scan.snapshot()))
}

/// GET /api/scan/state - 当前状态快照（轮询用）
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<ApiResponse<RunState>> {
    Json(ApiResponse::success(state.scan.snapshot()))
}

/// GET /api/scan/ws - 状态推送
pub async fn state_socket(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let rx = state.scan.subscribe();
    ws.on_upgrade(move |socket| push_state(socket, rx))
}

/// Send the current snapshot, then one per change, until the client leaves.
async fn push_state(socket: WebSocket, mut rx: watch::Receiver<RunState>) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        let payload = serde_json::to_string(&*rx.borrow_and_update());
        let text = match payload {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("failed to encode run state: {}", e);
                break;
            }
        };
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }

        let changed = loop {
            tokio::select! {
                res = rx.changed() => break res.is_ok(),
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break false,
                    // 客户端的其他消息忽略
                    Some(Ok(_)) => {}
                },
            }
        };
        if !changed {
            break;
        }
    }

    let _ = sender.close().await;
    tracing::debug!("state socket closed");
}
