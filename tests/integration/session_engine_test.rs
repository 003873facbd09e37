// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::helpers::{test_settings, with_selectors};
use collectrs::domain::models::outcome::FetchOutcome;
use collectrs::domain::models::task::{CollectTask, StrategyKind};
use collectrs::engines::block_detector::BlockDetector;
use collectrs::engines::identity::IdentityPool;
use collectrs::engines::rate_policy::{DomainRatePolicy, RatePolicyConfig};
use collectrs::engines::session_engine::SessionCrawlEngine;
use collectrs::engines::traits::FetchStrategy;
use std::sync::Arc;
use wiremock::matchers::{header_exists, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn plausible_page() -> String {
    format!("<html><body>listing{}</body></html>", "x".repeat(600))
}

async fn engine_for(server: &MockServer) -> SessionCrawlEngine {
    let mut settings = test_settings(&[("mock", true)], 3, 1);
    with_selectors(&mut settings, "mock", &server.uri());
    let settings = Arc::new(settings);

    let policy = Arc::new(DomainRatePolicy::new(RatePolicyConfig::from_settings(
        &settings,
    )));
    let detector = Arc::new(BlockDetector::new(&settings.detection));
    let identities = Arc::new(IdentityPool::new());
    SessionCrawlEngine::new(settings, policy, detector, identities)
}

#[tokio::test]
async fn session_chains_referer_across_requests() {
    let server = MockServer::start().await;

    // 第1页请求没有Referer要求
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plausible_page()))
        .expect(1)
        .mount(&server)
        .await;

    // 第2页请求必须带上会话延续出来的Referer
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .and(header_exists("Referer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plausible_page()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;

    let first = CollectTask::new("mock", "laptop", 1, StrategyKind::Session, 3);
    let second = CollectTask::new("mock", "laptop", 2, StrategyKind::Session, 3);

    assert!(engine.fetch(&first).await.unwrap().is_success());
    assert!(engine.fetch(&second).await.unwrap().is_success());

    // 未匹配Referer时第2个mock不会命中，verify会失败
    server.verify().await;
}

#[tokio::test]
async fn close_is_idempotent_and_resets_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plausible_page()))
        .mount(&server)
        .await;

    let engine = engine_for(&server).await;
    let task = CollectTask::new("mock", "laptop", 1, StrategyKind::Session, 3);
    assert!(engine.fetch(&task).await.unwrap().is_success());

    engine.close().await;
    engine.close().await;

    // 关闭后仍可抓取（新的会话从头建立）
    let outcome = engine.fetch(&task).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Success(_)));
}
