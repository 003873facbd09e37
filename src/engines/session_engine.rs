// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::outcome::FetchOutcome;
use crate::domain::models::task::CollectTask;
use crate::engines::block_detector::BlockDetector;
use crate::engines::http_engine::{hard_failure_reason, outcome_from_response};
use crate::engines::identity::IdentityPool;
use crate::engines::rate_policy::DomainRatePolicy;
use crate::engines::traits::{EngineError, FetchStrategy};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// 会话式爬取引擎
///
/// 与HTTP引擎相反，这里为每个域维护一个持久客户端：
/// Cookie在同一域的连续请求间延续，并以上一次访问的页面
/// 作为Referer，模拟框架式爬虫的翻页会话。身份仍按次轮换。
pub struct SessionCrawlEngine {
    settings: Arc<Settings>,
    policy: Arc<DomainRatePolicy>,
    detector: Arc<BlockDetector>,
    identities: Arc<IdentityPool>,
    /// 每个域的持久客户端
    clients: DashMap<String, reqwest::Client>,
    /// 每个域最近一次访问的URL，作为下一次请求的Referer
    last_url: DashMap<String, String>,
}

impl SessionCrawlEngine {
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
            clients: DashMap::new(),
            last_url: DashMap::new(),
        }
    }

    fn client_for(&self, domain: &str) -> Result<reqwest::Client, String> {
        if let Some(client) = self.clients.get(domain) {
            return Ok(client.clone());
        }
        // UA不在客户端上固定，逐请求设置以保持身份轮换
        let client = reqwest::Client::builder()
            .timeout(self.settings.fetch_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| format!("client build failed: {}", e))?;
        self.clients.insert(domain.to_string(), client.clone());
        Ok(client)
    }

    async fn attempt(&self, task: &CollectTask) -> FetchOutcome {
        let Some(source) = self.settings.source(&task.source) else {
            return FetchOutcome::HardFailure(format!("unknown source: {}", task.source));
        };
        let url = match source.search_url(&task.keyword, task.page) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::HardFailure(format!("invalid search url: {}", e)),
        };

        let client = match self.client_for(task.domain()) {
            Ok(client) => client,
            Err(reason) => return FetchOutcome::HardFailure(reason),
        };
        let identity = self.identities.next_for(task.domain());

        let mut request = client
            .get(url.clone())
            .header("User-Agent", identity.user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", identity.accept_language);
        if let Some(referer) = self.last_url.get(task.domain()) {
            request = request.header("Referer", referer.clone());
        }

        let start = Instant::now();
        let response = match request.send().await {
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

        let outcome = outcome_from_response(
            &self.detector,
            status,
            content,
            content_type,
            start.elapsed().as_millis() as u64,
        );
        if outcome.is_success() {
            self.last_url.insert(task.domain().to_string(), url.to_string());
        }
        outcome
    }
}

#[async_trait]
impl FetchStrategy for SessionCrawlEngine {
    async fn fetch(&self, task: &CollectTask) -> Result<FetchOutcome, EngineError> {
        let domain = task.domain();
        let wait = self.policy.next_delay(domain);
        if !wait.is_zero() {
            debug!(domain, wait_ms = wait.as_millis() as u64, "Rate limiting session fetch");
            tokio::time::sleep(wait).await;
        }

        let outcome = self.attempt(task).await;
        self.policy.record_outcome(domain, &outcome);
        Ok(outcome)
    }

    async fn close(&self) {
        // 丢弃全部会话客户端与Referer链；重复调用无害
        self.clients.clear();
        self.last_url.clear();
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
