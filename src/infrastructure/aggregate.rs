// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::record::{ProductRecord, RecordKey};
use crate::domain::models::task::CollectTask;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

/// 已入库的记录及其修订历史
struct StoredRecord {
    /// 当前版本（同键中抓取时间最新者）
    current: ProductRecord,
    /// 首次发现顺序，决定finalize的稳定输出顺序
    discovery_index: u64,
    /// 被替换下来的历史版本，按入库顺序排列
    revisions: Vec<ProductRecord>,
}

#[derive(Default)]
struct AggregateState {
    by_key: HashMap<RecordKey, StoredRecord>,
    next_index: u64,
    per_source_accepted: BTreeMap<String, u64>,
    per_task_accepted: HashMap<Uuid, u64>,
}

/// 结果聚合器
///
/// 将所有工作器提取出的记录合并为单一去重流。同一自然键
/// 只保留抓取时间最新的版本（last-write-wins），被替换的
/// 版本进入修订历史而不是被丢弃。内容完全相同的重复记录
/// 不产生新修订。内部同步，临界区短小。
pub struct ResultAggregator {
    state: Mutex<AggregateState>,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregateState::default()),
        }
    }

    /// 摄入一批提取结果
    ///
    /// # 参数
    ///
    /// * `records` - 同一任务提取出的记录
    /// * `task` - 产出这批记录的任务
    ///
    /// # 返回值
    ///
    /// 实际接受（新增、更新或进入修订历史）的记录数；
    /// 与现有版本内容完全相同的记录不计入
    pub fn ingest(&self, records: Vec<ProductRecord>, task: &CollectTask) -> usize {
        let mut state = self.state.lock();
        let mut accepted = 0u64;

        for record in records {
            let key = record.key();
            if let Some(stored) = state.by_key.get_mut(&key) {
                if stored.current.same_content(&record) {
                    // 完全相同的重复抓取，忽略
                    continue;
                }
                if record.scraped_at >= stored.current.scraped_at {
                    // 新版本胜出，旧版本降级为修订
                    let displaced = std::mem::replace(&mut stored.current, record);
                    stored.revisions.push(displaced);
                } else {
                    // 迟到的旧版本直接进入修订历史
                    stored.revisions.push(record);
                }
                accepted += 1;
                continue;
            }

            let index = state.next_index;
            state.next_index += 1;
            state.by_key.insert(
                key,
                StoredRecord {
                    current: record,
                    discovery_index: index,
                    revisions: Vec::new(),
                },
            );
            accepted += 1;
        }

        if accepted > 0 {
            *state
                .per_source_accepted
                .entry(task.source.clone())
                .or_default() += accepted;
            *state.per_task_accepted.entry(task.id).or_default() += accepted;
        }

        debug!(
            task_id = %task.id,
            source = %task.source,
            accepted,
            "Ingested records"
        );
        accepted as usize
    }

    /// 产出最终去重后的记录序列
    ///
    /// 按首次发现顺序稳定排序，保证下游导出可复现
    pub fn finalize(&self) -> Vec<ProductRecord> {
        let state = self.state.lock();
        let mut entries: Vec<(u64, ProductRecord)> = state
            .by_key
            .values()
            .map(|s| (s.discovery_index, s.current.clone()))
            .collect();
        entries.sort_by_key(|(index, _)| *index);
        entries.into_iter().map(|(_, record)| record).collect()
    }

    /// 查询某个自然键的修订历史（旧版本）
    pub fn history(&self, key: &RecordKey) -> Vec<ProductRecord> {
        let state = self.state.lock();
        state
            .by_key
            .get(key)
            .map(|s| s.revisions.clone())
            .unwrap_or_default()
    }

    /// 当前去重后的记录总数
    pub fn record_count(&self) -> u64 {
        self.state.lock().by_key.len() as u64
    }

    /// 各数据源接受的记录数
    pub fn per_source_accepted(&self) -> BTreeMap<String, u64> {
        self.state.lock().per_source_accepted.clone()
    }

    /// 指定任务接受的记录数
    pub fn task_accepted(&self, task_id: Uuid) -> u64 {
        self.state
            .lock()
            .per_task_accepted
            .get(&task_id)
            .copied()
            .unwrap_or(0)
    }
}
