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

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use collectrs::config::settings::Settings;
use collectrs::domain::models::task::StrategyKind;
use collectrs::domain::services::extraction::SelectorExtractor;
use collectrs::engines::resolver::EngineResolver;
use collectrs::infrastructure::storage::JsonFileSink;
use collectrs::utils::telemetry;
use collectrs::workers::manager::CollectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 多源商品数据采集工具
#[derive(Parser)]
#[command(name = "collectrs", version, about = "Multi-source product data collector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 从指定数据源采集商品数据
    Scrape {
        /// 逗号分隔的数据源列表
        #[arg(long, default_value = "amazon,ebay")]
        sources: String,
        /// 逗号分隔的搜索关键词
        #[arg(long)]
        keywords: String,
        /// 每个源×关键词的最大页数
        #[arg(long, default_value_t = 5)]
        max_pages: u32,
        /// 抓取策略 (http, browser, session)；缺省使用各源配置
        #[arg(long)]
        strategy: Option<String>,
        /// 输出目录覆盖
        #[arg(long)]
        output: Option<String>,
    },
    /// 列出配置的数据源
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();

    let cli = Cli::parse();

    // 2. Load configuration
    let mut settings = Settings::new().context("Failed to load configuration")?;

    match cli.command {
        Command::Sources => {
            list_sources(&settings);
            Ok(())
        }
        Command::Scrape {
            sources,
            keywords,
            max_pages,
            strategy,
            output,
        } => {
            if let Some(dir) = output {
                settings.export.output_dir = dir;
            }
            let strategy = match strategy.as_deref() {
                None => None,
                Some(raw) => Some(
                    raw.parse::<StrategyKind>()
                        .map_err(|_| anyhow::anyhow!("Unknown strategy: {}", raw))?,
                ),
            };
            let sources: Vec<String> = split_csv(&sources);
            let keywords: Vec<String> = split_csv(&keywords);
            if keywords.is_empty() {
                bail!("At least one keyword is required");
            }

            run_scrape(settings, sources, keywords, max_pages, strategy).await
        }
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn list_sources(settings: &Settings) {
    let mut names: Vec<_> = settings.sources.keys().collect();
    names.sort();
    for name in names {
        let cfg = &settings.sources[name];
        let status = if cfg.enabled { "enabled" } else { "disabled" };
        println!("{:<12} {:<9} {}", name, status, cfg.base_url);
    }
}

async fn run_scrape(
    settings: Settings,
    sources: Vec<String>,
    keywords: Vec<String>,
    max_pages: u32,
    strategy: Option<StrategyKind>,
) -> Result<()> {
    info!("Starting collectrs...");
    let settings = Arc::new(settings);

    // 3. Initialize components
    let resolver = Arc::new(EngineResolver::new(settings.clone()));
    let extractor = Arc::new(SelectorExtractor::new(settings.clone()));
    let sink = Arc::new(JsonFileSink::new(settings.export.output_dir.clone()));
    let manager = Arc::new(CollectionManager::new(
        settings.clone(),
        resolver,
        extractor,
        sink,
    ));

    // 4. Wire Ctrl-C to cooperative cancellation
    let cancel = manager.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing in-flight fetches...");
            cancel.cancel();
        }
    });

    // 5. Periodic progress reporting while the run is live
    let monitor = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            interval.tick().await;
            loop {
                interval.tick().await;
                let p = manager.progress();
                info!(
                    pending = p.pending,
                    in_flight = p.in_flight,
                    succeeded = p.succeeded,
                    retrying = p.retrying,
                    failed = p.failed,
                    records = p.records_collected,
                    "Progress {:.1}%",
                    p.completion_rate(manager.total_tasks())
                );
            }
        })
    };

    let result = manager
        .collect(&sources, &keywords, max_pages, strategy)
        .await;
    monitor.abort();

    let (records, report) = result?;

    // 6. Print the final report
    println!("\nCollection finished in {}s", report.duration().num_seconds());
    println!(
        "{:<12} {:>10} {:>14} {:>12} {:>9} {:>9}",
        "source", "succeeded", "soft-exhausted", "hard-failed", "retries", "records"
    );
    for (source, stats) in &report.per_source {
        println!(
            "{:<12} {:>10} {:>14} {:>12} {:>9} {:>9}",
            source,
            stats.succeeded,
            stats.soft_block_exhausted,
            stats.hard_failed,
            stats.retries,
            stats.records
        );
    }
    println!(
        "\nTotal: {} records from {} tasks ({} failed{})",
        records.len(),
        report.total_tasks,
        report.total_failed(),
        if report.cancelled { ", run cancelled" } else { "" }
    );

    Ok(())
}
