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

use crate::domain::models::task::StrategyKind;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// 应用程序配置设置
///
/// 包含采集、退避、封锁检测、数据源和导出等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 采集配置
    pub scraping: ScrapingSettings,
    /// 退避配置
    pub backoff: BackoffSettings,
    /// 封锁检测配置
    #[serde(default)]
    pub detection: DetectionSettings,
    /// 数据源配置（按源名称索引）
    #[serde(default)]
    pub sources: HashMap<String, SourceSettings>,
    /// 导出配置
    pub export: ExportSettings,
}

/// 采集配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapingSettings {
    /// 并发工作器数量
    pub worker_count: usize,
    /// 软封锁最大重试次数
    pub max_retries: u32,
    /// 硬失败重试上限（比软封锁更快放弃）
    pub hard_failure_retries: u32,
    /// 单次抓取超时时间（秒）
    pub fetch_timeout_secs: u64,
    /// 默认请求间隔下限（秒）
    pub delay_min_secs: f64,
    /// 默认请求间隔上限（秒）
    pub delay_max_secs: f64,
    /// 浏览器引擎滚动次数
    pub browser_scroll_passes: u32,
    /// 浏览器引擎滚动间等待时间（毫秒）
    pub browser_scroll_wait_ms: u64,
}

/// 退避配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSettings {
    /// 间隔上限（秒），退避增长不会超过此值
    pub ceiling_secs: f64,
    /// 每次连续失败的间隔增长倍数
    pub multiplier: f64,
}

/// 封锁检测配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionSettings {
    /// 页面内容最小可信长度（字节）
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    /// 封锁指示词列表（不区分大小写的子串匹配）
    #[serde(default = "default_blocking_phrases")]
    pub blocking_phrases: Vec<String>,
    /// 页面内验证码文本标记
    #[serde(default = "default_captcha_markers")]
    pub captcha_markers: Vec<String>,
    /// 页面内验证码元素选择器
    #[serde(default = "default_captcha_selectors")]
    pub captcha_selectors: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_content_length: default_min_content_length(),
            blocking_phrases: default_blocking_phrases(),
            captcha_markers: default_captcha_markers(),
            captcha_selectors: default_captcha_selectors(),
        }
    }
}

fn default_min_content_length() -> usize {
    500
}

fn default_blocking_phrases() -> Vec<String> {
    [
        "access denied",
        "captcha",
        "cloudflare",
        "please verify you are human",
        "unusual traffic",
        "automated queries",
        "bot detected",
        "too many requests",
        "rate limit",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_captcha_markers() -> Vec<String> {
    ["captcha", "recaptcha", "hcaptcha", "security check", "are you a robot"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_captcha_selectors() -> Vec<String> {
    [
        "iframe[src*='recaptcha']",
        "div[class*='captcha']",
        "div[id*='captcha']",
        ".g-recaptcha",
        "#captcha",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// 数据源配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// 是否启用该数据源
    #[serde(default)]
    pub enabled: bool,
    /// 站点根地址
    pub base_url: String,
    /// 搜索路径模板，支持 {keyword} 与 {page} 占位符
    pub search_path: String,
    /// 请求间隔下限覆盖（秒）
    pub delay_min_secs: Option<f64>,
    /// 请求间隔上限覆盖（秒）
    pub delay_max_secs: Option<f64>,
    /// 抓取策略覆盖
    pub strategy: Option<StrategyKind>,
    /// 商品提取选择器
    pub selectors: Option<SelectorSettings>,
}

impl SourceSettings {
    /// 构建搜索页URL
    ///
    /// # 参数
    ///
    /// * `keyword` - 搜索关键词（会进行URL编码）
    /// * `page` - 页码
    ///
    /// # 返回值
    ///
    /// * `Ok(Url)` - 完整的搜索页地址
    /// * `Err(url::ParseError)` - 配置中的地址无法解析
    pub fn search_url(&self, keyword: &str, page: u32) -> Result<Url, url::ParseError> {
        let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        let path = self
            .search_path
            .replace("{keyword}", &encoded)
            .replace("{page}", &page.to_string());
        Url::parse(&self.base_url)?.join(&path)
    }

    /// 获取该源的请求间隔范围，未覆盖时回落到全局默认值
    pub fn delay_range(&self, defaults: &ScrapingSettings) -> (f64, f64) {
        (
            self.delay_min_secs.unwrap_or(defaults.delay_min_secs),
            self.delay_max_secs.unwrap_or(defaults.delay_max_secs),
        )
    }
}

/// 商品提取选择器配置
///
/// 每个数据源的商品列表页通过这些CSS选择器解析
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSettings {
    /// 单个商品容器选择器
    pub container: String,
    /// 标题选择器
    pub title: String,
    /// 商品链接选择器（缺省时使用标题元素上的href）
    pub link: Option<String>,
    /// 价格选择器
    pub price: Option<String>,
    /// 原价选择器
    pub original_price: Option<String>,
    /// 评分选择器
    pub rating: Option<String>,
    /// 评论数选择器
    pub review_count: Option<String>,
    /// 图片选择器
    pub image: Option<String>,
    /// 容器上携带商品ID的属性名（如 data-asin）
    pub product_id_attr: Option<String>,
}

/// 导出配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    /// 采集结果输出目录
    pub output_dir: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、配置文件与环境变量加载配置
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default scraping settings
            .set_default("scraping.worker_count", 4)?
            .set_default("scraping.max_retries", 3)?
            .set_default("scraping.hard_failure_retries", 1)?
            .set_default("scraping.fetch_timeout_secs", 30)?
            .set_default("scraping.delay_min_secs", 1.0)?
            .set_default("scraping.delay_max_secs", 3.0)?
            .set_default("scraping.browser_scroll_passes", 3)?
            .set_default("scraping.browser_scroll_wait_ms", 500)?
            // Default backoff settings
            .set_default("backoff.ceiling_secs", 60.0)?
            .set_default("backoff.multiplier", 2.0)?
            // Default export settings
            .set_default("export.output_dir", "data_output/raw")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("COLLECTRS").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// 查找数据源配置
    pub fn source(&self, name: &str) -> Option<&SourceSettings> {
        self.sources.get(name)
    }

    /// 判断数据源是否启用
    pub fn is_source_enabled(&self, name: &str) -> bool {
        self.sources.get(name).map(|s| s.enabled).unwrap_or(false)
    }

    /// 列出所有启用的数据源名称
    pub fn enabled_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// 单次抓取超时时间
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.scraping.fetch_timeout_secs)
    }
}
