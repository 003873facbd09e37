// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{test_settings, FakeResolver, ScriptedStrategy, StubExtractor};
use collectrs::domain::models::outcome::FetchOutcome;
use collectrs::infrastructure::storage::NullSink;
use collectrs::workers::manager::CollectionManager;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn manager_with(
    strategy: Arc<ScriptedStrategy>,
    extractor: StubExtractor,
    sources: &[(&str, bool)],
    max_retries: u32,
    hard_failure_retries: u32,
) -> CollectionManager {
    CollectionManager::new(
        Arc::new(test_settings(sources, max_retries, hard_failure_retries)),
        Arc::new(FakeResolver::new(strategy)),
        Arc::new(extractor),
        Arc::new(NullSink),
    )
}

#[tokio::test]
async fn scenario_soft_block_then_success_across_two_domains() {
    // 两个域各3个任务；alpha第一次尝试被软封锁，之后成功
    let strategy = Arc::new(ScriptedStrategy::new());
    strategy.script(
        "alpha",
        vec![FetchOutcome::SoftBlocked("rate limited".to_string())],
    );

    let manager = manager_with(
        strategy.clone(),
        StubExtractor::new(),
        &[("alpha", true), ("beta", true)],
        3,
        1,
    );

    let sources = vec!["alpha".to_string(), "beta".to_string()];
    let keywords = vec!["laptop".to_string()];
    let (records, report) = manager
        .collect(&sources, &keywords, 3, None)
        .await
        .unwrap();

    // 被封锁的域需要4次抓取（3任务+1重试），另一域3次
    assert_eq!(strategy.fetches_for("alpha"), 4);
    assert_eq!(strategy.fetches_for("beta"), 3);

    // 统计：恰好1次重试，全部任务最终成功
    assert_eq!(report.total_retries(), 1);
    assert_eq!(report.per_source["alpha"].retries, 1);
    assert_eq!(report.total_succeeded(), 6);
    assert_eq!(report.total_failed(), 0);

    // 记录只来自成功的抓取：6任务 × 2条
    assert_eq!(records.len(), 12);
    assert_eq!(report.total_records, 12);

    // 引擎资源已释放
    assert!(strategy.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn scenario_retry_ceiling_exhaustion() {
    // max_retries=2，始终软封锁：恰好3次尝试后进入终态失败
    let strategy = Arc::new(ScriptedStrategy::new());
    strategy.script(
        "alpha",
        vec![
            FetchOutcome::SoftBlocked("captcha".to_string()),
            FetchOutcome::SoftBlocked("captcha".to_string()),
            FetchOutcome::SoftBlocked("captcha".to_string()),
            FetchOutcome::SoftBlocked("captcha".to_string()),
        ],
    );

    let manager = manager_with(
        strategy.clone(),
        StubExtractor::new(),
        &[("alpha", true)],
        2,
        1,
    );

    let sources = vec!["alpha".to_string()];
    let keywords = vec!["laptop".to_string()];
    let (records, report) = manager
        .collect(&sources, &keywords, 1, None)
        .await
        .unwrap();

    assert_eq!(strategy.total_fetches.load(Ordering::SeqCst), 3);
    assert!(records.is_empty());
    assert_eq!(report.per_source["alpha"].soft_block_exhausted, 1);
    assert_eq!(report.per_source["alpha"].succeeded, 0);
    assert_eq!(report.per_source["alpha"].retries, 2);
}

#[tokio::test]
async fn hard_failures_abandon_faster_than_soft_blocks() {
    // max_retries=3 但 hard_failure_retries=1：硬失败只允许2次尝试
    let strategy = Arc::new(ScriptedStrategy::new());
    strategy.script(
        "alpha",
        vec![
            FetchOutcome::HardFailure("connection refused".to_string()),
            FetchOutcome::HardFailure("connection refused".to_string()),
            FetchOutcome::HardFailure("connection refused".to_string()),
        ],
    );

    let manager = manager_with(
        strategy.clone(),
        StubExtractor::new(),
        &[("alpha", true)],
        3,
        1,
    );

    let sources = vec!["alpha".to_string()];
    let keywords = vec!["laptop".to_string()];
    let (records, report) = manager
        .collect(&sources, &keywords, 1, None)
        .await
        .unwrap();

    assert_eq!(strategy.total_fetches.load(Ordering::SeqCst), 2);
    assert!(records.is_empty());
    assert_eq!(report.per_source["alpha"].hard_failed, 1);
    assert_eq!(report.per_source["alpha"].retries, 1);
}

#[tokio::test]
async fn extraction_error_fails_task_without_killing_pool() {
    let strategy = Arc::new(ScriptedStrategy::new());
    // alpha的提取总是失败，beta正常；hard_failure_retries=0直接放弃
    let manager = manager_with(
        strategy.clone(),
        StubExtractor::failing_for("alpha"),
        &[("alpha", true), ("beta", true)],
        3,
        0,
    );

    let sources = vec!["alpha".to_string(), "beta".to_string()];
    let keywords = vec!["laptop".to_string()];
    let (records, report) = manager
        .collect(&sources, &keywords, 2, None)
        .await
        .unwrap();

    // beta不受alpha失败影响
    assert_eq!(report.per_source["beta"].succeeded, 2);
    assert_eq!(report.per_source["alpha"].hard_failed, 2);
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn cancellation_is_cooperative_and_releases_resources() {
    let strategy =
        Arc::new(ScriptedStrategy::new().with_fetch_delay(Duration::from_millis(100)));
    let manager = Arc::new(manager_with(
        strategy.clone(),
        StubExtractor::new(),
        &[("alpha", true)],
        3,
        1,
    ));

    let cancel = manager.cancel_handle();
    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let sources = vec!["alpha".to_string()];
            let keywords = vec!["laptop".to_string()];
            manager.collect(&sources, &keywords, 20, None).await
        })
    };

    tokio::time::sleep(Duration::from_millis(250)).await;
    cancel.cancel();
    let (records, report) = runner.await.unwrap().unwrap();

    assert!(report.cancelled);
    // 进行中的抓取被允许完成，部分结果被保留
    assert!(report.total_succeeded() > 0);
    assert!(!records.is_empty());

    // 队列未损坏：剩余任务数与已结束任务数自洽，且无任务仍在飞行
    let progress = manager.progress();
    assert_eq!(progress.in_flight, 0);
    assert_eq!(
        progress.pending as u64 + report.total_succeeded() + report.total_failed(),
        manager.total_tasks()
    );

    // 取消后资源仍被释放
    assert!(strategy.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn fatal_engine_failure_aborts_run_but_closes_engines() {
    let strategy = Arc::new(ScriptedStrategy::new().with_fatal_source("alpha"));
    let manager = manager_with(
        strategy.clone(),
        StubExtractor::new(),
        &[("alpha", true)],
        3,
        1,
    );

    let sources = vec!["alpha".to_string()];
    let keywords = vec!["laptop".to_string()];
    let result = manager.collect(&sources, &keywords, 3, None).await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains("Browser unavailable"));
    // 即使运行中止，引擎资源也已释放
    assert!(strategy.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn disabled_and_unknown_sources_are_skipped() {
    let strategy = Arc::new(ScriptedStrategy::new());
    let manager = manager_with(
        strategy.clone(),
        StubExtractor::new(),
        &[("alpha", true), ("beta", false)],
        3,
        1,
    );

    let sources = vec![
        "alpha".to_string(),
        "beta".to_string(),
        "nonexistent".to_string(),
    ];
    let keywords = vec!["laptop".to_string()];
    let (_, report) = manager.collect(&sources, &keywords, 2, None).await.unwrap();

    assert_eq!(report.total_tasks, 2);
    assert!(report.per_source.get("beta").is_none());

    // 全部源不可用时运行直接报错
    let strategy = Arc::new(ScriptedStrategy::new());
    let manager = manager_with(
        strategy,
        StubExtractor::new(),
        &[("beta", false)],
        3,
        1,
    );
    let sources = vec!["beta".to_string()];
    assert!(manager.collect(&sources, &keywords, 2, None).await.is_err());
}

#[tokio::test]
async fn first_pages_are_scheduled_before_later_pages() {
    // 单工作器下出队顺序完全确定：先所有源×关键词的1-2页，再3-5页
    let strategy = Arc::new(ScriptedStrategy::new());
    let mut settings = test_settings(&[("alpha", true)], 3, 1);
    settings.scraping.worker_count = 1;
    let manager = CollectionManager::new(
        Arc::new(settings),
        Arc::new(FakeResolver::new(strategy)),
        Arc::new(StubExtractor::new()),
        Arc::new(NullSink),
    );

    let sources = vec!["alpha".to_string()];
    let keywords = vec!["laptop".to_string()];
    let (records, _) = manager.collect(&sources, &keywords, 5, None).await.unwrap();

    // 记录按聚合发现顺序稳定输出；前两页的记录必须排在最前
    let pages: Vec<u32> = records.iter().map(|r| r.page_number).collect();
    assert_eq!(pages[0..4], [1, 1, 2, 2]);
    assert_eq!(pages[4..], [3, 3, 4, 4, 5, 5]);
}
