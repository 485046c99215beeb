use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::ApiResponse;
use score_scan::config;

/// 健康检查
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "score-scan 服务运行正常",
        "version": env!("CARGO_PKG_VERSION"),
        "build_time": env!("BUILD_TIME"),
    }))
}

/// 服务信息 / Service info
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub version: &'static str,
    pub build_time: &'static str,
    pub lookup_endpoint: String,
    pub max_parallelism: usize,
    pub max_candidates: u64,
}

pub async fn get_server_status() -> Json<ApiResponse<ServerStatus>> {
    let config = config::config();

    Json(ApiResponse::success(ServerStatus {
        version: env!("CARGO_PKG_VERSION"),
        build_time: env!("BUILD_TIME"),
        lookup_endpoint: config.lookup.base_url.clone(),
        max_parallelism: config.scan.parallelism_limit(),
        max_candidates: config.scan.candidate_limit(),
    }))
}
