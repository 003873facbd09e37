// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 采集任务实体
///
/// 表示一个 (数据源, 关键词, 页码) 的抓取工作单元。
/// 任务由编排管理器按笛卡尔积生成，带有优先级与重试计数，
/// 失败后通过重新入队的方式延后重试。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectTask {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 数据源名称，同时作为限速状态的域标识
    pub source: String,
    /// 搜索关键词
    pub keyword: String,
    /// 搜索结果页码，从1开始
    pub page: u32,
    /// 抓取策略选择器
    pub strategy: StrategyKind,
    /// 任务优先级，数值越大越先调度
    pub priority: i32,
    /// 任务状态，跟踪任务在其生命周期中的当前阶段
    pub status: TaskStatus,
    /// 已重试次数，记录任务失败后被重新入队的次数
    pub attempt_count: u32,
    /// 最大重试次数，软封锁重试的上限
    pub max_retries: u32,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 抓取策略类型枚举
///
/// 三种策略实现同一抓取契约，调度器对它们一视同仁；
/// 选择完全由任务上的配置值决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// 轻量HTTP抓取
    #[default]
    Http,
    /// 无头浏览器抓取
    Browser,
    /// 会话式爬取（持久连接与Cookie延续）
    Session,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StrategyKind::Http => write!(f, "http"),
            StrategyKind::Browser => write!(f, "browser"),
            StrategyKind::Session => write!(f, "session"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(StrategyKind::Http),
            "browser" => Ok(StrategyKind::Browser),
            "session" => Ok(StrategyKind::Session),
            _ => Err(()),
        }
    }
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Queued → Active → Completed/Failed/Cancelled
///
/// Completed 与 Failed 为终态：达到终态的任务不可再入队，
/// 这保证已完成的任务即使被错误地重新提交也不会被再次执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 已入队，任务已创建但尚未开始执行
    #[default]
    Queued,
    /// 活跃中，任务正在被执行
    Active,
    /// 已完成，任务成功执行完成
    Completed,
    /// 已失败，任务执行失败且已耗尽重试预算
    Failed,
    /// 已取消，任务被取消执行
    Cancelled,
}

impl TaskStatus {
    /// 判断是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合业务规则时发生
    #[error("Invalid state transition")]
    InvalidStateTransition,
}

impl CollectTask {
    /// 创建一个新的采集任务
    ///
    /// # 参数
    ///
    /// * `source` - 数据源名称
    /// * `keyword` - 搜索关键词
    /// * `page` - 页码
    /// * `strategy` - 抓取策略
    /// * `max_retries` - 最大重试次数
    ///
    /// # 返回值
    ///
    /// 返回新创建的任务实例，状态为 Queued，重试计数为0
    pub fn new(
        source: impl Into<String>,
        keyword: impl Into<String>,
        page: u32,
        strategy: StrategyKind,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            keyword: keyword.into(),
            page,
            strategy,
            priority: 0,
            status: TaskStatus::Queued,
            attempt_count: 0,
            max_retries,
            created_at: Utc::now(),
        }
    }

    /// 设置任务优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 任务所属的限速域
    ///
    /// 每个数据源的限速与健康状态独立跟踪
    pub fn domain(&self) -> &str {
        &self.source
    }

    /// 启动任务
    ///
    /// 将任务状态从Queued变更为Active
    pub fn start(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Queued => {
                self.status = TaskStatus::Active;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成任务
    ///
    /// 将任务状态从Active变更为Completed
    pub fn complete(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Active => {
                self.status = TaskStatus::Completed;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记任务失败（终态）
    pub fn fail(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Active => {
                self.status = TaskStatus::Failed;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 取消任务
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Queued | TaskStatus::Active => {
                self.status = TaskStatus::Cancelled;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 将任务重新放回队列（重试）
    ///
    /// 递增重试计数并把状态改回Queued。调用方必须先通过
    /// `can_retry`（或硬失败的独立上限）确认预算未耗尽。
    pub fn requeue(&mut self) -> Result<(), DomainError> {
        match self.status {
            TaskStatus::Active => {
                self.attempt_count += 1;
                self.status = TaskStatus::Queued;
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 判断软封锁后任务是否还可以重试
    ///
    /// 重试计数严格小于最大重试次数时返回true，
    /// 因此一个任务的总抓取次数不会超过 max_retries + 1
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_retries
    }
}
