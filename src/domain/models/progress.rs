// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 运行进度快照
///
/// 编排管理器按需重算的只读视图，供CLI等外部调用方轮询；
/// 不做任何持久化。
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// 等待调度的任务数
    pub pending: usize,
    /// 正在执行的任务数
    pub in_flight: usize,
    /// 已成功的任务数
    pub succeeded: u64,
    /// 软封锁后等待重试的任务数
    pub retrying: usize,
    /// 终态失败的任务数
    pub failed: u64,
    /// 已收集的记录数
    pub records_collected: u64,
    /// 已运行时长
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// 已结束（成功或失败）的任务占比，0-100
    pub fn completion_rate(&self, total_tasks: u64) -> f64 {
        if total_tasks == 0 {
            return 0.0;
        }
        (self.succeeded + self.failed) as f64 / total_tasks as f64 * 100.0
    }
}

/// 单个数据源的最终统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStats {
    /// 成功完成的任务数
    pub succeeded: u64,
    /// 重试耗尽后放弃的软封锁任务数
    pub soft_block_exhausted: u64,
    /// 硬失败放弃的任务数
    pub hard_failed: u64,
    /// 调度过的重试总次数
    pub retries: u64,
    /// 该源贡献的记录数
    pub records: u64,
}

/// 一次采集运行的最终报告
///
/// 每个源的 {成功, 软封锁耗尽, 硬失败} 计数始终完整上报，
/// 部分成功永远可观测，不会被静默吞掉。
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
    /// 总任务数
    pub total_tasks: u64,
    /// 按数据源的统计
    pub per_source: BTreeMap<String, SourceStats>,
    /// 收集的记录总数
    pub total_records: u64,
    /// 运行是否被取消
    pub cancelled: bool,
}

impl RunReport {
    /// 成功任务总数
    pub fn total_succeeded(&self) -> u64 {
        self.per_source.values().map(|s| s.succeeded).sum()
    }

    /// 终态失败任务总数（软封锁耗尽 + 硬失败）
    pub fn total_failed(&self) -> u64 {
        self.per_source
            .values()
            .map(|s| s.soft_block_exhausted + s.hard_failed)
            .sum()
    }

    /// 重试总次数
    pub fn total_retries(&self) -> u64 {
        self.per_source.values().map(|s| s.retries).sum()
    }

    /// 运行时长
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
