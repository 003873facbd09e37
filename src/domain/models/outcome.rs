// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};

/// 一次成功抓取返回的页面
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应内容
    pub content: String,
    /// 内容类型
    pub content_type: String,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
    /// 抓取完成时间
    pub fetched_at: DateTime<Utc>,
}

/// 单次抓取尝试的结果
///
/// 由抓取策略产出，工作器据此决定接受、重试或放弃：
/// 软封锁走重新入队的重试路径，硬失败更快放弃。
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 抓取成功，携带原始页面
    Success(FetchedPage),
    /// 软封锁：验证码、限流等可恢复的反爬响应
    SoftBlocked(String),
    /// 硬失败：网络错误、明确的404等不可恢复错误
    HardFailure(String),
}

impl FetchOutcome {
    /// 是否为成功结果
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// 结果类别标签，用于日志与指标
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success(_) => "success",
            FetchOutcome::SoftBlocked(_) => "soft_blocked",
            FetchOutcome::HardFailure(_) => "hard_failure",
        }
    }
}
