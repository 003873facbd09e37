// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use collectrs::config::settings::{
    BackoffSettings, DetectionSettings, ExportSettings, ScrapingSettings, SelectorSettings,
    Settings, SourceSettings,
};
use collectrs::domain::models::outcome::{FetchOutcome, FetchedPage};
use collectrs::domain::models::record::ProductRecord;
use collectrs::domain::models::task::{CollectTask, StrategyKind};
use collectrs::domain::services::extraction::{ExtractionError, Extractor};
use collectrs::engines::resolver::StrategyResolver;
use collectrs::engines::traits::{EngineError, FetchStrategy};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 构建测试用配置
pub fn test_settings(sources: &[(&str, bool)], max_retries: u32, hard_failure_retries: u32) -> Settings {
    let mut source_map = HashMap::new();
    for (name, enabled) in sources {
        source_map.insert(
            name.to_string(),
            SourceSettings {
                enabled: *enabled,
                base_url: format!("https://{}.example.com", name),
                search_path: "/s?k={keyword}&page={page}".to_string(),
                delay_min_secs: Some(0.0),
                delay_max_secs: Some(0.0),
                strategy: None,
                selectors: None,
            },
        );
    }
    Settings {
        scraping: ScrapingSettings {
            worker_count: 3,
            max_retries,
            hard_failure_retries,
            fetch_timeout_secs: 5,
            delay_min_secs: 0.0,
            delay_max_secs: 0.0,
            browser_scroll_passes: 0,
            browser_scroll_wait_ms: 0,
        },
        backoff: BackoffSettings {
            ceiling_secs: 60.0,
            multiplier: 2.0,
        },
        detection: DetectionSettings::default(),
        sources: source_map,
        export: ExportSettings {
            output_dir: "data_output/raw".to_string(),
        },
    }
}

/// 给指定源附加选择器配置（wiremock引擎测试用）
pub fn with_selectors(settings: &mut Settings, source: &str, base_url: &str) {
    let cfg = settings.sources.get_mut(source).unwrap();
    cfg.base_url = base_url.to_string();
    cfg.selectors = Some(SelectorSettings {
        container: "div.result".to_string(),
        title: "h2 a".to_string(),
        link: None,
        price: Some("span.price".to_string()),
        original_price: None,
        rating: None,
        review_count: None,
        image: None,
        product_id_attr: Some("data-item-id".to_string()),
    });
}

fn success_page() -> FetchedPage {
    FetchedPage {
        status_code: 200,
        content: "<html><body>scripted result page</body></html>".to_string(),
        content_type: "text/html".to_string(),
        response_time_ms: 1,
        fetched_at: Utc::now(),
    }
}

/// 脚本化抓取策略
///
/// 按数据源预排一串结果，脚本耗尽后默认返回成功；
/// 记录每个源的抓取次数以及close调用。
pub struct ScriptedStrategy {
    scripts: Mutex<HashMap<String, VecDeque<FetchOutcome>>>,
    per_source_fetches: Mutex<HashMap<String, u32>>,
    pub total_fetches: AtomicU32,
    pub closed: AtomicBool,
    /// 模拟抓取耗时（取消测试用）
    fetch_delay: Option<Duration>,
    /// 对该源的抓取返回进程级故障
    fatal_source: Option<String>,
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            per_source_fetches: Mutex::new(HashMap::new()),
            total_fetches: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            fetch_delay: None,
            fatal_source: None,
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn with_fatal_source(mut self, source: &str) -> Self {
        self.fatal_source = Some(source.to_string());
        self
    }

    /// 为指定源预排结果脚本
    pub fn script(&self, source: &str, outcomes: Vec<FetchOutcome>) {
        self.scripts
            .lock()
            .insert(source.to_string(), outcomes.into());
    }

    pub fn fetches_for(&self, source: &str) -> u32 {
        self.per_source_fetches
            .lock()
            .get(source)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl FetchStrategy for ScriptedStrategy {
    async fn fetch(&self, task: &CollectTask) -> Result<FetchOutcome, EngineError> {
        if let Some(fatal) = &self.fatal_source {
            if &task.source == fatal {
                return Err(EngineError::BrowserUnavailable(
                    "scripted fatal failure".to_string(),
                ));
            }
        }

        self.total_fetches.fetch_add(1, Ordering::SeqCst);
        *self
            .per_source_fetches
            .lock()
            .entry(task.source.clone())
            .or_default() += 1;

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(&task.source)
            .and_then(|q| q.pop_front());
        Ok(scripted.unwrap_or_else(|| FetchOutcome::Success(success_page())))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 把所有策略都解析为同一个脚本化引擎的解析器
pub struct FakeResolver {
    pub strategy: Arc<ScriptedStrategy>,
}

impl FakeResolver {
    pub fn new(strategy: Arc<ScriptedStrategy>) -> Self {
        Self { strategy }
    }
}

#[async_trait]
impl StrategyResolver for FakeResolver {
    fn resolve(&self, _kind: StrategyKind) -> Arc<dyn FetchStrategy> {
        self.strategy.clone()
    }

    async fn close_all(&self) {
        self.strategy.close().await;
    }
}

/// 按任务生成固定记录的提取器
///
/// 每次成功抓取产出两条记录，商品ID由任务坐标决定，
/// 因此重试同一任务不会产生新记录。
pub struct StubExtractor {
    /// 对该源的提取返回错误
    pub fail_for_source: Option<String>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self {
            fail_for_source: None,
        }
    }

    pub fn failing_for(source: &str) -> Self {
        Self {
            fail_for_source: Some(source.to_string()),
        }
    }
}

impl Extractor for StubExtractor {
    fn extract(
        &self,
        _page: &FetchedPage,
        task: &CollectTask,
    ) -> Result<Vec<ProductRecord>, ExtractionError> {
        if let Some(source) = &self.fail_for_source {
            if &task.source == source {
                return Err(ExtractionError::MissingConfig(source.clone()));
            }
        }

        Ok((1..=2)
            .map(|i| ProductRecord {
                source: task.source.clone(),
                product_id: Some(format!("{}-{}-p{}-{}", task.source, task.keyword, task.page, i)),
                title: format!("{} item {}", task.keyword, i),
                url: format!(
                    "https://{}.example.com/item/{}-p{}-{}",
                    task.source, task.keyword, task.page, i
                ),
                price: Some(10.0 * i as f64),
                original_price: None,
                currency: "USD".to_string(),
                rating: None,
                review_count: None,
                image_url: None,
                seller_name: None,
                condition: None,
                availability: None,
                search_keyword: task.keyword.clone(),
                page_number: task.page,
                position_on_page: i,
                scraped_at: Utc::now(),
            })
            .collect())
    }
}
