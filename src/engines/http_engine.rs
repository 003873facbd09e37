// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::Settings;
use crate::domain::models::outcome::{FetchOutcome, FetchedPage};
use crate::domain::models::task::CollectTask;
use crate::engines::block_detector::{BlockDetector, Classification};
use crate::engines::identity::IdentityPool;
use crate::engines::rate_policy::DomainRatePolicy;
use crate::engines::traits::{EngineError, FetchStrategy};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// 轻量HTTP抓取引擎
///
/// 基于reqwest实现的基本HTTP抓取策略，适合无需JS渲染的页面
pub struct HttpEngine {
    settings: Arc<Settings>,
    policy: Arc<DomainRatePolicy>,
    detector: Arc<BlockDetector>,
    identities: Arc<IdentityPool>,
}

impl HttpEngine {
    pub fn new(
        settings: Arc<Settings>,
        policy: Arc<DomainRatePolicy>,
        detector: Arc<BlockDetector>,
        identities: Arc<IdentityPool>,
    ) -> Self {
        Self {
            settings,
            policy,
            detector,
            identities,
        }
    }
}

/// 将HTTP响应转换为抓取结果
pub(crate) fn outcome_from_response(
    detector: &BlockDetector,
    status: u16,
    content: String,
    content_type: String,
    response_time_ms: u64,
) -> FetchOutcome {
    match detector.classify(status, &content) {
        Classification::Success => FetchOutcome::Success(FetchedPage {
            status_code: status,
            content,
            content_type,
            response_time_ms,
            fetched_at: Utc::now(),
        }),
        Classification::SoftBlocked(reason) => FetchOutcome::SoftBlocked(reason),
        Classification::HardFailure(reason) => FetchOutcome::HardFailure(reason),
    }
}

/// 将reqwest错误转换为硬失败原因
pub(crate) fn hard_failure_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timeout".to_string()
    } else if err.is_connect() {
        format!("connection error: {}", err)
    } else {
        format!("request error: {}", err)
    }
}

#[async_trait]
impl FetchStrategy for HttpEngine {
    /// 执行一次HTTP抓取
    ///
    /// 先向限速策略申请等待，随后以全新客户端发起请求
    /// （Cookie隔离），最后将结果上报给限速策略。
    async fn fetch(&self, task: &CollectTask) -> Result<FetchOutcome, EngineError> {
        let domain = task.domain();
        let wait = self.policy.next_delay(domain);
        if !wait.is_zero() {
            debug!(domain, wait_ms = wait.as_millis() as u64, "Rate limiting fetch");
            tokio::time::sleep(wait).await;
        }

        let outcome = self.attempt(task).await;
        self.policy.record_outcome(domain, &outcome);
        Ok(outcome)
    }

    async fn close(&self) {
        // 每次请求使用独立客户端，没有需要释放的资源
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

impl HttpEngine {
    async fn attempt(&self, task: &CollectTask) -> FetchOutcome {
        let Some(source) = self.settings.source(&task.source) else {
            return FetchOutcome::HardFailure(format!("unknown source: {}", task.source));
        };
        let url = match source.search_url(&task.keyword, task.page) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::HardFailure(format!("invalid search url: {}", e)),
        };

        let identity = self.identities.next_for(task.domain());

        // Each request gets a fresh client for cookie isolation
        let client = match reqwest::Client::builder()
            .user_agent(identity.user_agent)
            .timeout(self.settings.fetch_timeout())
            .cookie_store(true)
            .build()
        {
            Ok(client) => client,
            Err(e) => return FetchOutcome::HardFailure(format!("client build failed: {}", e)),
        };

        let start = Instant::now();
        let response = match client
            .get(url.clone())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", identity.accept_language)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::HardFailure(hard_failure_reason(&e)),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let content = match response.text().await {
            Ok(content) => content,
            Err(e) => return FetchOutcome::HardFailure(hard_failure_reason(&e)),
        };

        outcome_from_response(
            &self.detector,
            status,
            content,
            content_type,
            start.elapsed().as_millis() as u64,
        )
    }
}
