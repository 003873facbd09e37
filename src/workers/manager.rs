// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::progress::{ProgressSnapshot, RunReport, SourceStats};
use crate::domain::models::record::ProductRecord;
use crate::domain::models::task::{CollectTask, StrategyKind};
use crate::domain::services::extraction::Extractor;
use crate::engines::resolver::StrategyResolver;
use crate::infrastructure::aggregate::ResultAggregator;
use crate::infrastructure::storage::RecordSink;
use crate::queue::TaskQueue;
use crate::workers::collect_worker::CollectWorker;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// 一次采集运行的共享状态
///
/// 工作器只更新这里的原子计数；进度以轮询快照的形式
/// 暴露给外部调用方，没有回调注册。
pub struct RunState {
    started: Instant,
    started_at: DateTime<Utc>,
    /// 尚未到达终态的任务数，运行排空的判定依据
    pub(crate) outstanding: AtomicU64,
    /// 提交的任务总数
    pub(crate) total_tasks: AtomicU64,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) succeeded: AtomicU64,
    pub(crate) failed: AtomicU64,
    /// 当前在队列中等待重试的任务数
    pub(crate) retrying: AtomicUsize,
    pub(crate) records: AtomicU64,
    pub(crate) cancelled: AtomicBool,
    pub(crate) per_source: Mutex<BTreeMap<String, SourceStats>>,
    /// 进程级故障信息，出现后运行被中止
    pub(crate) fatal: Mutex<Option<String>>,
}

impl RunState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            outstanding: AtomicU64::new(0),
            total_tasks: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retrying: AtomicUsize::new(0),
            records: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            per_source: Mutex::new(BTreeMap::new()),
            fatal: Mutex::new(None),
        }
    }

    /// 更新某个源的统计
    pub(crate) fn with_source<F: FnOnce(&mut SourceStats)>(&self, source: &str, f: F) {
        let mut per_source = self.per_source.lock();
        f(per_source.entry(source.to_string()).or_default());
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 协作式取消句柄
///
/// 取消只设置一个标志，工作器在任务间检查它；
/// 进行中的抓取会先完成，避免资源泄漏。
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<RunState>,
}

impl CancelHandle {
    /// 请求取消当前运行
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        info!("Cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

/// 编排管理器
///
/// 顶层入口：把 (数据源 × 关键词 × 页码) 的笛卡尔积展开为
/// 任务集，驱动工作器池直到队列排空或被取消，聚合去重后的
/// 记录交给落地接口，并在任何退出路径上保证释放全部引擎资源。
///
/// 一个实例对应一次运行。
pub struct CollectionManager {
    settings: Arc<Settings>,
    resolver: Arc<dyn StrategyResolver>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn RecordSink>,
    queue: Arc<TaskQueue>,
    aggregator: Arc<ResultAggregator>,
    state: Arc<RunState>,
}

impl CollectionManager {
    pub fn new(
        settings: Arc<Settings>,
        resolver: Arc<dyn StrategyResolver>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            settings,
            resolver,
            extractor,
            sink,
            queue: Arc::new(TaskQueue::new()),
            aggregator: Arc::new(ResultAggregator::new()),
            state: Arc::new(RunState::new()),
        }
    }

    /// 构建任务集
    ///
    /// 对每个启用的数据源 × 关键词 × 页码生成一个任务；
    /// 前两页获得更高优先级，让首批结果尽快出现。
    /// 未配置或未启用的源被跳过并告警。
    pub fn build_tasks(
        &self,
        sources: &[String],
        keywords: &[String],
        max_pages: u32,
        strategy: Option<StrategyKind>,
    ) -> Vec<CollectTask> {
        let mut tasks = Vec::new();
        for source in sources {
            let Some(source_cfg) = self.settings.source(source) else {
                warn!("Source {} is not configured, skipping", source);
                continue;
            };
            if !source_cfg.enabled {
                warn!("Source {} is disabled, skipping", source);
                continue;
            }
            let kind = strategy
                .or(source_cfg.strategy)
                .unwrap_or_default();

            for keyword in keywords {
                for page in 1..=max_pages {
                    let priority = if page <= 2 { 2 } else { 1 };
                    tasks.push(
                        CollectTask::new(
                            source.clone(),
                            keyword.clone(),
                            page,
                            kind,
                            self.settings.scraping.max_retries,
                        )
                        .with_priority(priority),
                    );
                }
            }
        }
        tasks
    }

    /// 执行一次完整采集
    ///
    /// # 参数
    ///
    /// * `sources` - 数据源名称列表
    /// * `keywords` - 搜索关键词列表
    /// * `max_pages` - 每个源×关键词的最大页数
    /// * `strategy` - 抓取策略覆盖，None时使用各源配置
    ///
    /// # 返回值
    ///
    /// * `Ok((records, report))` - 去重后的记录与运行统计
    /// * `Err` - 进程级故障（引擎资源已释放）
    pub async fn collect(
        &self,
        sources: &[String],
        keywords: &[String],
        max_pages: u32,
        strategy: Option<StrategyKind>,
    ) -> anyhow::Result<(Vec<ProductRecord>, RunReport)> {
        let tasks = self.build_tasks(sources, keywords, max_pages, strategy);
        if tasks.is_empty() {
            return Err(anyhow!("No runnable tasks: check that sources are configured and enabled"));
        }

        let total = tasks.len() as u64;
        self.state.total_tasks.store(total, Ordering::SeqCst);
        self.state.outstanding.store(total, Ordering::SeqCst);
        for task in tasks {
            self.queue
                .push(task)
                .expect("freshly built tasks are never terminal");
        }

        let worker_count = self.settings.scraping.worker_count.max(1);
        info!(
            total_tasks = total,
            worker_count, "Starting collection run"
        );

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = CollectWorker::new(
                worker_id,
                self.queue.clone(),
                self.resolver.clone(),
                self.extractor.clone(),
                self.aggregator.clone(),
                self.state.clone(),
                self.settings.scraping.hard_failure_retries,
            );
            handles.push(tokio::spawn(async move { worker.run().await }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task panicked: {}", e);
            }
        }

        // 无论成功、取消还是故障，引擎资源都必须释放
        self.resolver.close_all().await;

        if let Some(fatal) = self.state.fatal.lock().take() {
            return Err(anyhow!("Collection aborted: {}", fatal));
        }

        let records = self.aggregator.finalize();
        let report = self.build_report();
        info!(
            records = records.len(),
            succeeded = report.total_succeeded(),
            failed = report.total_failed(),
            retries = report.total_retries(),
            cancelled = report.cancelled,
            "Collection run finished"
        );

        // 落地失败不吞掉已聚合的结果
        if let Err(e) = self.sink.save(&records, &report) {
            error!("Failed to persist records: {}", e);
        }

        Ok((records, report))
    }

    /// 当前运行进度快照，按需重算
    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pending: self.queue.len(),
            in_flight: self.state.in_flight.load(Ordering::SeqCst),
            succeeded: self.state.succeeded.load(Ordering::SeqCst),
            retrying: self.state.retrying.load(Ordering::SeqCst),
            failed: self.state.failed.load(Ordering::SeqCst),
            records_collected: self.state.records.load(Ordering::SeqCst),
            elapsed: self.state.started.elapsed(),
        }
    }

    /// 获取取消句柄
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.state.clone(),
        }
    }

    /// 提交的任务总数
    pub fn total_tasks(&self) -> u64 {
        self.state.total_tasks.load(Ordering::SeqCst)
    }

    fn build_report(&self) -> RunReport {
        RunReport {
            started_at: self.state.started_at,
            finished_at: Utc::now(),
            total_tasks: self.state.total_tasks.load(Ordering::SeqCst),
            per_source: self.state.per_source.lock().clone(),
            total_records: self.aggregator.record_count(),
            cancelled: self.state.is_cancelled(),
        }
    }
}
