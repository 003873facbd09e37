// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::task::StrategyKind;
use crate::engines::block_detector::BlockDetector;
use crate::engines::browser_engine::BrowserEngine;
use crate::engines::http_engine::HttpEngine;
use crate::engines::identity::IdentityPool;
use crate::engines::rate_policy::{DomainRatePolicy, RatePolicyConfig};
use crate::engines::session_engine::SessionCrawlEngine;
use crate::engines::traits::FetchStrategy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// 策略解析器特质
///
/// 调度器通过此接口把任务上的策略选择映射为具体引擎；
/// 选择是任务配置的纯函数，不涉及评分或负载均衡。
#[async_trait]
pub trait StrategyResolver: Send + Sync {
    /// 解析任务应使用的抓取引擎
    fn resolve(&self, kind: StrategyKind) -> Arc<dyn FetchStrategy>;

    /// 关闭全部引擎资源（幂等）
    async fn close_all(&self);
}

/// 标准引擎集合解析器
///
/// 持有三种抓取引擎，它们共享同一限速策略、封锁检测器
/// 与身份池。
pub struct EngineResolver {
    http: Arc<HttpEngine>,
    browser: Arc<BrowserEngine>,
    session: Arc<SessionCrawlEngine>,
}

impl EngineResolver {
    /// 依据配置构建全部引擎
    pub fn new(settings: Arc<Settings>) -> Self {
        let policy = Arc::new(DomainRatePolicy::new(RatePolicyConfig::from_settings(
            &settings,
        )));
        let detector = Arc::new(BlockDetector::new(&settings.detection));
        let identities = Arc::new(IdentityPool::new());
        Self::with_components(settings, policy, detector, identities)
    }

    /// 使用指定组件构建（便于测试注入）
    pub fn with_components(
        settings: Arc<Settings>,
        policy: Arc<DomainRatePolicy>,
        detector: Arc<BlockDetector>,
        identities: Arc<IdentityPool>,
    ) -> Self {
        Self {
            http: Arc::new(HttpEngine::new(
                settings.clone(),
                policy.clone(),
                detector.clone(),
                identities.clone(),
            )),
            browser: Arc::new(BrowserEngine::new(
                settings.clone(),
                policy.clone(),
                detector.clone(),
                identities.clone(),
            )),
            session: Arc::new(SessionCrawlEngine::new(settings, policy, detector, identities)),
        }
    }
}

#[async_trait]
impl StrategyResolver for EngineResolver {
    fn resolve(&self, kind: StrategyKind) -> Arc<dyn FetchStrategy> {
        match kind {
            StrategyKind::Http => self.http.clone(),
            StrategyKind::Browser => self.browser.clone(),
            StrategyKind::Session => self.session.clone(),
        }
    }

    async fn close_all(&self) {
        self.http.close().await;
        self.session.close().await;
        self.browser.close().await;
        info!("All fetch engines closed");
    }
}
