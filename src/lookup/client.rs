//! 成绩查询 HTTP 客户端

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{LookupError, ScoreLookup};
use crate::config::LookupConfig;
use crate::models::ScoreRecord;

const SEARCH_ENDPOINT: &str = "search_exam_all_score.jsp";

/// HTTP implementation backed by a shared reqwest connection pool / 基于 reqwest 的实现
pub struct HttpScoreLookup {
    client: Client,
    endpoint: String,
    course: String,
}

impl HttpScoreLookup {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint_url(&config.base_url),
            course: config.course.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// 拼接查询地址（容忍 base_url 末尾缺少 '/'）
fn endpoint_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), SEARCH_ENDPOINT)
}

#[async_trait]
impl ScoreLookup for HttpScoreLookup {
    async fn query_by_identity(&self, name: &str, id: &str) -> Result<Vec<ScoreRecord>, LookupError> {
        let resp = self.client
            .get(&self.endpoint)
            .query(&[
                ("student_name", name.trim()),
                ("student_num", id.trim()),
                ("course", self.course.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body).map_err(|e| LookupError::Decode(e.to_string()))
    }
}
