// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::outcome::FetchOutcome;
use crate::domain::models::task::CollectTask;
use crate::engines::block_detector::BlockDetector;
use crate::engines::http_engine::outcome_from_response;
use crate::engines::identity::IdentityPool;
use crate::engines::rate_policy::DomainRatePolicy;
use crate::engines::traits::{EngineError, FetchStrategy};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 无头浏览器抓取引擎
///
/// 基于chromiumoxide实现的浏览器自动化抓取策略。浏览器实例
/// 在首次使用时启动并全程复用，避免每次请求重新拉起Chrome。
/// 页面加载后执行有限次数的滚动与等待，并在接受页面前检测
/// 页面内的验证码标记。
pub struct BrowserEngine {
    settings: Arc<Settings>,
    policy: Arc<DomainRatePolicy>,
    detector: Arc<BlockDetector>,
    identities: Arc<IdentityPool>,
    browser: Mutex<Option<Browser>>,
    closed: AtomicBool,
}

impl BrowserEngine {
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
            browser: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// 获取或启动共享浏览器实例并打开一个新页面
    ///
    /// 浏览器启动失败属于进程级故障，向上传播中止运行
    async fn new_page(&self) -> Result<Page, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed("browser"));
        }

        let mut guard = self.browser.lock().await;
        if guard.is_none() {
            let remote_debugging_url = std::env::var("COLLECTRS_REMOTE_DEBUGGING_URL").ok();

            let (browser, mut handler) = if let Some(ref url) = remote_debugging_url {
                info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url).await.map_err(|e| {
                    EngineError::BrowserUnavailable(format!(
                        "failed to connect to remote Chrome: {}",
                        e
                    ))
                })?
            } else {
                let config = BrowserConfig::builder()
                    .no_sandbox()
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage")
                    .request_timeout(self.settings.fetch_timeout())
                    .build()
                    .map_err(|e| EngineError::BrowserUnavailable(e.to_string()))?;
                Browser::launch(config)
                    .await
                    .map_err(|e| EngineError::BrowserUnavailable(e.to_string()))?
            };

            // Spawn a handler to process browser events
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            *guard = Some(browser);
        }

        guard
            .as_ref()
            .expect("browser initialized above")
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::BrowserUnavailable(e.to_string()))
    }

    /// 检查页面内容是否包含验证码标记
    fn captcha_reason(&self, content: &str) -> Option<String> {
        let lowered = content.to_lowercase();
        for marker in &self.settings.detection.captcha_markers {
            if lowered.contains(&marker.to_lowercase()) {
                return Some(format!("captcha marker: {}", marker));
            }
        }

        let document = Html::parse_document(content);
        for raw in &self.settings.detection.captcha_selectors {
            if let Ok(selector) = Selector::parse(raw) {
                if document.select(&selector).next().is_some() {
                    return Some(format!("captcha element: {}", raw));
                }
            }
        }
        None
    }

    async fn attempt(&self, task: &CollectTask) -> Result<FetchOutcome, EngineError> {
        let Some(source) = self.settings.source(&task.source) else {
            return Ok(FetchOutcome::HardFailure(format!(
                "unknown source: {}",
                task.source
            )));
        };
        let url = match source.search_url(&task.keyword, task.page) {
            Ok(url) => url,
            Err(e) => {
                return Ok(FetchOutcome::HardFailure(format!(
                    "invalid search url: {}",
                    e
                )))
            }
        };

        let identity = self.identities.next_for(task.domain());
        let scroll_passes = self.settings.scraping.browser_scroll_passes;
        let scroll_wait = Duration::from_millis(self.settings.scraping.browser_scroll_wait_ms);
        let start = Instant::now();

        let page = self.new_page().await?;

        // Wrap the page work in the fetch timeout; a timeout is a HardFailure
        let navigated = tokio::time::timeout(self.settings.fetch_timeout(), async {
            page.set_user_agent(identity.user_agent)
                .await
                .map_err(|e| format!("set user agent failed: {}", e))?;
            page.goto(url.as_str())
                .await
                .map_err(|e| format!("navigation failed: {}", e))?;

            // 有限的页面交互：滚动触发懒加载，然后短暂等待
            for _ in 0..scroll_passes {
                page.evaluate("window.scrollBy(0, window.innerHeight);")
                    .await
                    .map_err(|e| format!("scroll failed: {}", e))?;
                tokio::time::sleep(scroll_wait).await;
            }

            page.content()
                .await
                .map_err(|e| format!("content read failed: {}", e))
        })
        .await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        let content = match navigated {
            Ok(Ok(content)) => content,
            Ok(Err(reason)) => return Ok(FetchOutcome::HardFailure(reason)),
            Err(_) => {
                return Ok(FetchOutcome::HardFailure(format!(
                    "browser fetch timeout after {}s",
                    self.settings.scraping.fetch_timeout_secs
                )))
            }
        };

        // 必须先排除验证码页面，才能将页面视为成功
        if let Some(reason) = self.captcha_reason(&content) {
            warn!(domain = task.domain(), "CAPTCHA detected: {}", reason);
            return Ok(FetchOutcome::SoftBlocked(reason));
        }

        // goto 不暴露原始状态码，按页面内容做分类
        Ok(outcome_from_response(
            &self.detector,
            200,
            content,
            "text/html".to_string(),
            start.elapsed().as_millis() as u64,
        ))
    }
}

#[async_trait]
impl FetchStrategy for BrowserEngine {
    async fn fetch(&self, task: &CollectTask) -> Result<FetchOutcome, EngineError> {
        let domain = task.domain();
        let wait = self.policy.next_delay(domain);
        if !wait.is_zero() {
            debug!(domain, wait_ms = wait.as_millis() as u64, "Rate limiting browser fetch");
            tokio::time::sleep(wait).await;
        }

        match self.attempt(task).await {
            Ok(outcome) => {
                self.policy.record_outcome(domain, &outcome);
                Ok(outcome)
            }
            // 进程级故障不计入域状态
            Err(e) => Err(e),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self.browser.lock().await;
        if let Some(mut browser) = guard.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
        }
        info!("Browser engine closed");
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
