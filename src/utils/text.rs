// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:[,\s]\d{3})+|\d+)(?:\.(\d{1,2}))?").unwrap());

static RATING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());

/// 清理文本字段
///
/// 合并空白字符并去除首尾空格
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 从价格文本中提取数值
///
/// 兼容货币符号、千位分隔符与区间价格（取第一个数值），
/// 例如 "$1,299.99" -> 1299.99，"US $25.00 to $40.00" -> 25.0
pub fn extract_price(raw: &str) -> Option<f64> {
    let caps = PRICE_RE.captures(raw)?;
    let whole: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let mut value: f64 = whole.parse().ok()?;
    if let Some(frac) = caps.get(2) {
        let cents: f64 = frac.as_str().parse().ok()?;
        value += cents / 10f64.powi(frac.as_str().len() as i32);
    }
    Some(value)
}

/// 从评分文本中提取数值
///
/// "4.5 out of 5 stars" -> 4.5；超出 [0, 5] 的值视为无效
pub fn extract_rating(raw: &str) -> Option<f32> {
    let caps = RATING_RE.captures(raw)?;
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    if (0.0..=5.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// 从评论数文本中提取数值
///
/// "1,234 ratings" -> 1234
pub fn extract_review_count(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// 将相对URL转换为绝对URL
pub fn absolutize_url(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(|u| u.to_string())
}
