// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 商品记录实体
///
/// 表示从搜索结果页提取出的单个商品。聚合器按自然键
/// （数据源 + 商品ID）去重，同键的旧版本进入修订历史。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    /// 数据源名称
    pub source: String,
    /// 源站商品ID（ASIN、eBay item ID等），可能缺失
    pub product_id: Option<String>,
    /// 商品标题
    pub title: String,
    /// 商品详情页URL
    pub url: String,
    /// 当前价格
    pub price: Option<f64>,
    /// 原价
    pub original_price: Option<f64>,
    /// 货币代码
    pub currency: String,
    /// 评分（0-5）
    pub rating: Option<f32>,
    /// 评论数
    pub review_count: Option<u32>,
    /// 主图URL
    pub image_url: Option<String>,
    /// 卖家名称
    pub seller_name: Option<String>,
    /// 商品成色（new、used、refurbished）
    pub condition: Option<String>,
    /// 库存状态
    pub availability: Option<String>,
    /// 命中的搜索关键词
    pub search_keyword: String,
    /// 所在结果页页码
    pub page_number: u32,
    /// 在页面中的位置，从1开始
    pub position_on_page: u32,
    /// 抓取时间
    pub scraped_at: DateTime<Utc>,
}

/// 商品自然键
///
/// 区分同一真实商品在多次抓取间的稳定标识。
/// 源站未暴露商品ID时退化为规范化后的商品URL。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// 数据源名称
    pub source: String,
    /// 商品ID或规范化URL
    pub product_ref: String,
}

impl ProductRecord {
    /// 计算记录的自然键
    pub fn key(&self) -> RecordKey {
        let product_ref = match &self.product_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => normalize_product_url(&self.url),
        };
        RecordKey {
            source: self.source.clone(),
            product_ref,
        }
    }

    /// 判断两条记录的商品内容是否一致
    ///
    /// 忽略抓取元数据（时间戳、页码、页内位置、关键词），
    /// 用于决定重复抓取是否产生新的修订版本
    pub fn same_content(&self, other: &ProductRecord) -> bool {
        self.title == other.title
            && self.price == other.price
            && self.original_price == other.original_price
            && self.currency == other.currency
            && self.rating == other.rating
            && self.review_count == other.review_count
            && self.availability == other.availability
            && self.condition == other.condition
            && self.seller_name == other.seller_name
    }
}

/// 规范化商品URL作为键的回落值
///
/// 去掉查询参数与片段标识符，避免同一商品因跟踪参数不同而被视为两条记录
fn normalize_product_url(url: &str) -> String {
    let trimmed = match url.find(['?', '#']) {
        Some(pos) => &url[..pos],
        None => url,
    };
    trimmed.trim_end_matches('/').to_ascii_lowercase()
}
