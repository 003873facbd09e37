// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{test_settings, with_selectors};
use collectrs::domain::models::outcome::FetchOutcome;
use collectrs::domain::models::task::{CollectTask, StrategyKind};
use collectrs::engines::block_detector::BlockDetector;
use collectrs::engines::http_engine::HttpEngine;
use collectrs::engines::identity::IdentityPool;
use collectrs::engines::rate_policy::{DomainRatePolicy, RatePolicyConfig};
use collectrs::engines::traits::FetchStrategy;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn plausible_page() -> String {
    format!(
        "<html><body><div class='result'>item</div>{}</body></html>",
        "x".repeat(600)
    )
}

async fn engine_for(server: &MockServer, fetch_timeout_secs: u64) -> (HttpEngine, Arc<DomainRatePolicy>) {
    let mut settings = test_settings(&[("mock", true)], 3, 1);
    settings.scraping.fetch_timeout_secs = fetch_timeout_secs;
    with_selectors(&mut settings, "mock", &server.uri());
    let settings = Arc::new(settings);

    let policy = Arc::new(DomainRatePolicy::new(RatePolicyConfig::from_settings(
        &settings,
    )));
    let detector = Arc::new(BlockDetector::new(&settings.detection));
    let identities = Arc::new(IdentityPool::new());
    (
        HttpEngine::new(settings, policy.clone(), detector, identities),
        policy,
    )
}

fn task() -> CollectTask {
    CollectTask::new("mock", "laptop", 1, StrategyKind::Http, 3)
}

#[tokio::test]
async fn successful_fetch_returns_page_and_records_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/s"))
        .and(query_param("k", "laptop"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plausible_page()))
        .mount(&server)
        .await;

    let (engine, policy) = engine_for(&server, 5).await;
    let outcome = engine.fetch(&task()).await.unwrap();

    match outcome {
        FetchOutcome::Success(page) => {
            assert_eq!(page.status_code, 200);
            assert!(page.content.contains("result"));
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(policy.consecutive_failures("mock"), 0);
}

#[tokio::test]
async fn forbidden_status_is_soft_blocked_and_widens_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string(plausible_page()))
        .mount(&server)
        .await;

    let (engine, policy) = engine_for(&server, 5).await;
    let outcome = engine.fetch(&task()).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::SoftBlocked(_)));
    // 引擎在返回前把结果上报给了限速策略
    assert_eq!(policy.consecutive_failures("mock"), 1);
}

#[tokio::test]
async fn tiny_response_is_soft_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let (engine, _) = engine_for(&server, 5).await;
    let outcome = engine.fetch(&task()).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::SoftBlocked(reason) if reason.contains("small")));
}

#[tokio::test]
async fn blocking_phrase_is_soft_blocked() {
    let server = MockServer::start().await;
    let body = format!(
        "<html><body>Please verify you are human{}</body></html>",
        "x".repeat(600)
    );
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let (engine, _) = engine_for(&server, 5).await;
    let outcome = engine.fetch(&task()).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::SoftBlocked(_)));
}

#[tokio::test]
async fn not_found_is_hard_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string(plausible_page()))
        .mount(&server)
        .await;

    let (engine, policy) = engine_for(&server, 5).await;
    let outcome = engine.fetch(&task()).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::HardFailure(reason) if reason.contains("404")));
    assert_eq!(policy.consecutive_failures("mock"), 1);
}

#[tokio::test]
async fn timeout_is_hard_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(plausible_page())
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let (engine, _) = engine_for(&server, 1).await;
    let outcome = engine.fetch(&task()).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::HardFailure(reason) if reason.contains("timeout")));
}

#[tokio::test]
async fn unknown_source_is_hard_failure() {
    let server = MockServer::start().await;
    let (engine, _) = engine_for(&server, 5).await;

    let unknown = CollectTask::new("ghost", "laptop", 1, StrategyKind::Http, 3);
    let outcome = engine.fetch(&unknown).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::HardFailure(reason) if reason.contains("unknown source")));
}
