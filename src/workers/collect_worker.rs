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

use crate::domain::models::outcome::FetchOutcome;
use crate::domain::models::record::ProductRecord;
use crate::domain::models::task::CollectTask;
use crate::domain::services::extraction::Extractor;
use crate::engines::resolver::StrategyResolver;
use crate::infrastructure::aggregate::ResultAggregator;
use crate::queue::TaskQueue;
use crate::workers::manager::RunState;
use metrics::counter;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// 失败类别，决定重试预算与统计归类
#[derive(Clone, Copy, PartialEq)]
enum FailureKind {
    Soft,
    Hard,
}

/// 采集工作器
///
/// 固定大小池中的一员：循环地从队列取任务、解析抓取策略、
/// 执行抓取并把结果交给聚合器。软封锁的任务重新入队延后
/// 重试（排在其余待处理任务之后，绝不原地立即重试），硬
/// 失败用更小的重试预算更快放弃。任何单个任务的失败都不会
/// 终止工作器池。
pub struct CollectWorker {
    worker_id: usize,
    queue: Arc<TaskQueue>,
    resolver: Arc<dyn StrategyResolver>,
    extractor: Arc<dyn Extractor>,
    aggregator: Arc<ResultAggregator>,
    state: Arc<RunState>,
    hard_failure_retries: u32,
}

impl CollectWorker {
    pub fn new(
        worker_id: usize,
        queue: Arc<TaskQueue>,
        resolver: Arc<dyn StrategyResolver>,
        extractor: Arc<dyn Extractor>,
        aggregator: Arc<ResultAggregator>,
        state: Arc<RunState>,
        hard_failure_retries: u32,
    ) -> Self {
        Self {
            worker_id,
            queue,
            resolver,
            extractor,
            aggregator,
            state,
            hard_failure_retries,
        }
    }

    /// 运行工作器循环，直到队列排空或运行被取消
    pub async fn run(&self) {
        debug!("Collect worker {} started", self.worker_id);

        loop {
            // 协作式取消：只在任务之间检查，进行中的抓取不被打断
            if self.state.is_cancelled() {
                break;
            }

            let Some(mut task) = self.queue.pop_next() else {
                if self.state.outstanding.load(Ordering::SeqCst) == 0 {
                    break;
                }
                // 队列暂空但还有任务在飞行中，它们可能重新入队
                sleep(Duration::from_millis(50)).await;
                continue;
            };

            if task.attempt_count > 0 {
                self.state.retrying.fetch_sub(1, Ordering::SeqCst);
            }
            self.state.in_flight.fetch_add(1, Ordering::SeqCst);
            let flow = self.process(&mut task).await;
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

            if flow.is_break() {
                break;
            }
        }

        debug!("Collect worker {} exiting", self.worker_id);
    }

    #[instrument(skip(self, task), fields(worker = self.worker_id, task_id = %task.id, source = %task.source, keyword = %task.keyword, page = task.page))]
    async fn process(&self, task: &mut CollectTask) -> ControlFlow<()> {
        if task.start().is_err() {
            warn!("Task in unexpected state {}, dropping", task.status);
            self.state.outstanding.fetch_sub(1, Ordering::SeqCst);
            return ControlFlow::Continue(());
        }

        let engine = self.resolver.resolve(task.strategy);
        match engine.fetch(task).await {
            Ok(FetchOutcome::Success(page)) => match self.extractor.extract(&page, task) {
                Ok(records) => self.handle_success(task, records),
                Err(e) => {
                    // 提取失败按任务级硬失败处理，而不是让运行崩溃
                    warn!("Extraction failed: {}", e);
                    self.retry_or_abandon(task, &e.to_string(), FailureKind::Hard);
                }
            },
            Ok(FetchOutcome::SoftBlocked(reason)) => {
                self.retry_or_abandon(task, &reason, FailureKind::Soft);
            }
            Ok(FetchOutcome::HardFailure(reason)) => {
                self.retry_or_abandon(task, &reason, FailureKind::Hard);
            }
            Err(e) => {
                // 进程级故障：记录并触发取消，让整个池停下
                error!("Fatal engine failure: {}", e);
                *self.state.fatal.lock() = Some(e.to_string());
                self.state.cancelled.store(true, Ordering::SeqCst);
                let _ = task.fail();
                self.state.failed.fetch_add(1, Ordering::SeqCst);
                self.state.outstanding.fetch_sub(1, Ordering::SeqCst);
                self.state
                    .with_source(&task.source, |s| s.hard_failed += 1);
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn handle_success(&self, task: &mut CollectTask, records: Vec<ProductRecord>) {
        let accepted = self.aggregator.ingest(records, task);
        task.complete().expect("active task completes");

        self.state.succeeded.fetch_add(1, Ordering::SeqCst);
        self.state.records.fetch_add(accepted as u64, Ordering::SeqCst);
        self.state.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.state.with_source(&task.source, |s| {
            s.succeeded += 1;
            s.records += accepted as u64;
        });
        counter!("tasks_total", "source" => task.source.clone(), "result" => "succeeded")
            .increment(1);

        info!(accepted, "Task succeeded");
    }

    /// 重试或放弃失败的任务
    ///
    /// 软封锁使用任务自身的max_retries预算；硬失败使用更小的
    /// hard_failure_retries上限，因为重试大概率无济于事。
    /// 重试通过重新入队实现，保持各域之间的公平性。
    fn retry_or_abandon(&self, task: &mut CollectTask, reason: &str, kind: FailureKind) {
        let ceiling = match kind {
            FailureKind::Soft => task.max_retries,
            FailureKind::Hard => self.hard_failure_retries.min(task.max_retries),
        };

        if task.attempt_count < ceiling {
            task.requeue().expect("active task requeues");
            match self.queue.push(task.clone()) {
                Ok(()) => {
                    self.state.retrying.fetch_add(1, Ordering::SeqCst);
                    self.state.with_source(&task.source, |s| s.retries += 1);
                    info!(
                        attempt = task.attempt_count,
                        max_retries = ceiling,
                        "Requeued after failure: {}",
                        reason
                    );
                }
                Err(e) => {
                    // push只会拒绝终态任务，requeue后不可能出现
                    error!("Failed to requeue task: {}", e);
                    self.state.failed.fetch_add(1, Ordering::SeqCst);
                    self.state.outstanding.fetch_sub(1, Ordering::SeqCst);
                }
            }
            return;
        }

        task.fail().expect("active task fails");
        self.state.failed.fetch_add(1, Ordering::SeqCst);
        self.state.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.state.with_source(&task.source, |s| match kind {
            FailureKind::Soft => s.soft_block_exhausted += 1,
            FailureKind::Hard => s.hard_failed += 1,
        });
        let result = match kind {
            FailureKind::Soft => "soft_block_exhausted",
            FailureKind::Hard => "hard_failed",
        };
        counter!("tasks_total", "source" => task.source.clone(), "result" => result).increment(1);

        warn!(
            attempts = task.attempt_count + 1,
            "Task abandoned after exhausting retries: {}",
            reason
        );
    }
}
