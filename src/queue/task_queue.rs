// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::CollectTask;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 终态任务不可入队
    #[error("Task {0} is terminal and cannot be queued")]
    Terminal(Uuid),
}

/// 堆内元素：任务与其入队序号
struct QueuedTask {
    task: CollectTask,
    /// 单调递增的入队序号，同优先级时保证FIFO
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // 优先级高者先出队；同优先级按入队顺序（seq小者先）
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 任务优先级队列
///
/// 出队顺序：优先级降序，同优先级按插入顺序（FIFO）。
/// 对相同输入的出队序列是确定的，这是可复现测试的前提。
/// 内部同步，支持多工作器并发存取，不丢失也不复制任务。
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    seq: AtomicU64,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// 入队任务
    ///
    /// 处于终态（已完成/已失败/已取消）的任务会被拒绝，
    /// 保证已完成的任务即使被错误地重新提交也不会再次执行。
    ///
    /// # 参数
    ///
    /// * `task` - 要入队的任务
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 入队成功
    /// * `Err(QueueError)` - 任务处于终态被拒绝
    pub fn push(&self, task: CollectTask) -> Result<(), QueueError> {
        if task.status.is_terminal() {
            return Err(QueueError::Terminal(task.id));
        }
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(QueuedTask { task, seq });
        Ok(())
    }

    /// 取出下一个待执行任务
    ///
    /// # 返回值
    ///
    /// * `Some(CollectTask)` - 优先级最高的任务
    /// * `None` - 队列为空
    pub fn pop_next(&self) -> Option<CollectTask> {
        self.heap.lock().pop().map(|q| q.task)
    }

    /// 队列中等待的任务数
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}
