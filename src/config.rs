//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::scan::{MAX_CANDIDATES, MAX_PARALLELISM};

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote lookup service / 远程查询服务配置
    #[serde(default)]
    pub lookup: LookupConfig,
    /// Scan engine tuning / 扫描引擎参数
    #[serde(default)]
    pub scan: ScanSettings,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Remote lookup configuration / 远程查询配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Service base URL, must end with '/' / 服务地址
    pub base_url: String,
    /// Course filter sent with every query / 课程过滤（全部 = 所有课程）
    pub course: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Idle connections kept per host / 每个主机保留的空闲连接数
    pub pool_max_idle_per_host: usize,
}

/// Scan engine tuning knobs / 扫描引擎调优参数
///
/// None of the throttling values are load-bearing for correctness; they only
/// bound how often snapshots are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Max identifiers per run, capped at [`MAX_CANDIDATES`] / 单次扫描最多候选数
    pub max_candidates: u64,
    /// Upper bound for the worker pool, capped at [`MAX_PARALLELISM`] / 并发上限
    pub max_parallelism: usize,
    /// Pool size used when the caller does not pick one / 默认并发数
    pub default_parallelism: usize,
    /// Queue capacity = parallelism * queue_factor / 队列容量倍数
    pub queue_factor: usize,
    /// Publish progress every N enqueued candidates / 进度更新步长
    pub progress_stride: u64,
    /// Min interval between "running" worker updates / worker 状态节流
    pub worker_status_interval_ms: u64,
    /// Log ring buffer capacity / 日志容量
    pub max_logs: usize,
    /// Per-call lookup timeout / 单次查询超时
    pub lookup_timeout_secs: u64,
    /// How long a superseded run may take to stop / 旧任务停止的最长等待
    pub stop_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8190,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.sales1.top/score/interface/".to_string(),
            course: "全部".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            pool_max_idle_per_host: 128,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_candidates: MAX_CANDIDATES,
            max_parallelism: MAX_PARALLELISM,
            default_parallelism: 4,
            queue_factor: 64,
            progress_stride: 50,
            worker_status_interval_ms: 80,
            max_logs: 200,
            lookup_timeout_secs: 10,
            stop_grace_ms: 5_000,
        }
    }
}

impl ScanSettings {
    /// Effective candidate limit; a larger configured value is ignored.
    pub fn candidate_limit(&self) -> u64 {
        self.max_candidates.min(MAX_CANDIDATES)
    }

    /// Effective pool limit, always within `1..=MAX_PARALLELISM`.
    pub fn parallelism_limit(&self) -> usize {
        self.max_parallelism.clamp(1, MAX_PARALLELISM)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn worker_status_interval(&self) -> Duration {
        Duration::from_millis(self.worker_status_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl AppConfig {
    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    load_config_from(&get_config_path())
}

/// Same as [`load_config`] but for an explicit path / 从指定路径加载
pub fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config_to(&config, config_path)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

fn save_config_to(config: &AppConfig, config_path: &Path) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config() -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config()?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG.set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get global configuration instance / 获取全局配置实例
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG.get_or_init(|| {
        let config = load_config().unwrap_or_default();
        Arc::new(RwLock::new(config))
    }).clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    get_config().read().clone()
}
