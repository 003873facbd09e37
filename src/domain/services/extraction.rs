// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::{SelectorSettings, Settings};
use crate::domain::models::outcome::FetchedPage;
use crate::domain::models::record::ProductRecord;
use crate::domain::models::task::CollectTask;
use crate::utils::text;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// 提取错误类型
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// 数据源缺少选择器配置
    #[error("No selector configuration for source: {0}")]
    MissingConfig(String),

    /// 选择器无法解析
    #[error("Invalid selector '{0}'")]
    BadSelector(String),

    /// 数据源根地址无法解析
    #[error("Invalid base url: {0}")]
    BadBaseUrl(#[from] url::ParseError),
}

/// 商品提取器特质
///
/// 编排核心通过此接口消费站点解析能力；具体的DOM规则
/// 对核心不可见，提取失败按任务级硬失败处理而非崩溃。
pub trait Extractor: Send + Sync {
    /// 从抓取到的页面中提取商品记录
    fn extract(
        &self,
        page: &FetchedPage,
        task: &CollectTask,
    ) -> Result<Vec<ProductRecord>, ExtractionError>;
}

/// 基于CSS选择器的商品提取器
///
/// 选择器来自各数据源的配置，提取后统一做文本清理、
/// 价格/评分解析与URL归一化
pub struct SelectorExtractor {
    settings: Arc<Settings>,
}

impl SelectorExtractor {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    fn parse_selector(raw: &str) -> Result<Selector, ExtractionError> {
        Selector::parse(raw).map_err(|_| ExtractionError::BadSelector(raw.to_string()))
    }

    /// 取出元素文本并清理空白
    fn element_text(element: &ElementRef) -> String {
        text::clean_text(&element.text().collect::<Vec<_>>().join(" "))
    }

    fn select_text(
        container: &ElementRef,
        selector: &Option<String>,
    ) -> Result<Option<String>, ExtractionError> {
        let Some(raw) = selector else {
            return Ok(None);
        };
        let sel = Self::parse_selector(raw)?;
        Ok(container
            .select(&sel)
            .next()
            .map(|e| Self::element_text(&e))
            .filter(|t| !t.is_empty()))
    }

    fn select_attr(
        container: &ElementRef,
        selector: &Option<String>,
        attr: &str,
    ) -> Result<Option<String>, ExtractionError> {
        let Some(raw) = selector else {
            return Ok(None);
        };
        let sel = Self::parse_selector(raw)?;
        Ok(container
            .select(&sel)
            .next()
            .and_then(|e| e.value().attr(attr))
            .map(|s| s.to_string()))
    }

    fn extract_one(
        container: &ElementRef,
        selectors: &SelectorSettings,
        base: &Url,
        task: &CollectTask,
        position: u32,
    ) -> Result<Option<ProductRecord>, ExtractionError> {
        let title_sel = Self::parse_selector(&selectors.title)?;
        let Some(title_el) = container.select(&title_sel).next() else {
            return Ok(None);
        };
        let title = Self::element_text(&title_el);
        if title.is_empty() {
            return Ok(None);
        }

        // 链接：优先独立的link选择器，否则用标题元素自身或其祖先的href
        let href = match &selectors.link {
            Some(_) => Self::select_attr(container, &selectors.link, "href")?,
            None => title_el
                .value()
                .attr("href")
                .map(|s| s.to_string())
                .or_else(|| {
                    title_el
                        .ancestors()
                        .filter_map(ElementRef::wrap)
                        .find_map(|a| a.value().attr("href").map(|s| s.to_string()))
                }),
        };
        let Some(href) = href else {
            return Ok(None);
        };
        let Some(url) = text::absolutize_url(base, &href) else {
            return Ok(None);
        };

        let product_id = selectors
            .product_id_attr
            .as_deref()
            .and_then(|attr| container.value().attr(attr))
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        let price = Self::select_text(container, &selectors.price)?
            .as_deref()
            .and_then(text::extract_price);
        let original_price = Self::select_text(container, &selectors.original_price)?
            .as_deref()
            .and_then(text::extract_price);
        let rating = Self::select_text(container, &selectors.rating)?
            .as_deref()
            .and_then(text::extract_rating);
        let review_count = Self::select_text(container, &selectors.review_count)?
            .as_deref()
            .and_then(text::extract_review_count);
        let image_url = Self::select_attr(container, &selectors.image, "src")?
            .and_then(|src| text::absolutize_url(base, &src));

        Ok(Some(ProductRecord {
            source: task.source.clone(),
            product_id,
            title,
            url,
            price,
            original_price,
            currency: "USD".to_string(),
            rating,
            review_count,
            image_url,
            seller_name: None,
            condition: None,
            availability: None,
            search_keyword: task.keyword.clone(),
            page_number: task.page,
            position_on_page: position,
            scraped_at: chrono::Utc::now(),
        }))
    }
}

impl Extractor for SelectorExtractor {
    fn extract(
        &self,
        page: &FetchedPage,
        task: &CollectTask,
    ) -> Result<Vec<ProductRecord>, ExtractionError> {
        let source = self
            .settings
            .source(&task.source)
            .ok_or_else(|| ExtractionError::MissingConfig(task.source.clone()))?;
        let selectors = source
            .selectors
            .as_ref()
            .ok_or_else(|| ExtractionError::MissingConfig(task.source.clone()))?;

        let base = Url::parse(&source.base_url)?;
        let container_sel = Self::parse_selector(&selectors.container)?;

        let document = Html::parse_document(&page.content);
        let mut records = Vec::new();
        for (idx, container) in document.select(&container_sel).enumerate() {
            if let Some(record) =
                Self::extract_one(&container, selectors, &base, task, idx as u32 + 1)?
            {
                records.push(record);
            }
        }

        debug!(
            source = %task.source,
            keyword = %task.keyword,
            page = task.page,
            count = records.len(),
            "Extracted product records"
        );
        Ok(records)
    }
}
