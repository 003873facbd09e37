// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::DetectionSettings;

/// 单次响应的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// 正常响应
    Success,
    /// 软封锁（可重试）
    SoftBlocked(String),
    /// 硬失败（不值得重试）
    HardFailure(String),
}

/// 封锁检测器
///
/// 将一次抓取响应分类为 成功 / 软封锁 / 硬失败。
/// 纯函数式、无共享状态，便于独立测试。
#[derive(Debug, Clone)]
pub struct BlockDetector {
    min_content_length: usize,
    /// 预先转小写的封锁指示词
    phrases: Vec<String>,
}

/// 反爬系统常用的软封锁状态码
const SOFT_BLOCK_STATUSES: [u16; 3] = [403, 429, 503];

impl BlockDetector {
    pub fn new(detection: &DetectionSettings) -> Self {
        Self {
            min_content_length: detection.min_content_length,
            phrases: detection
                .blocking_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// 分类一次抓取响应
    ///
    /// # 参数
    ///
    /// * `status` - HTTP状态码
    /// * `body` - 响应正文
    ///
    /// # 返回值
    ///
    /// 分类结果：
    /// * 403/429/503 → 软封锁
    /// * 其他 >= 400 → 硬失败（明确的不可恢复错误）
    /// * 正文过短或包含封锁指示词 → 软封锁
    /// * 其余 → 成功
    pub fn classify(&self, status: u16, body: &str) -> Classification {
        if SOFT_BLOCK_STATUSES.contains(&status) {
            return Classification::SoftBlocked(format!("blocking status {}", status));
        }
        if status >= 400 {
            return Classification::HardFailure(format!("http status {}", status));
        }

        if body.len() < self.min_content_length {
            return Classification::SoftBlocked(format!(
                "suspiciously small response ({} bytes)",
                body.len()
            ));
        }

        let lowered = body.to_lowercase();
        for phrase in &self.phrases {
            if lowered.contains(phrase) {
                return Classification::SoftBlocked(format!("blocking indicator: {}", phrase));
            }
        }

        Classification::Success
    }
}
