// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::domain::models::outcome::FetchOutcome;
use dashmap::DashMap;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 限速策略配置
#[derive(Debug, Clone)]
pub struct RatePolicyConfig {
    /// 默认请求间隔范围（秒）
    pub default_range: (f64, f64),
    /// 间隔上限（秒）
    pub ceiling_secs: f64,
    /// 连续失败时的间隔增长倍数
    pub multiplier: f64,
    /// 各域的基础间隔覆盖
    pub per_domain: HashMap<String, (f64, f64)>,
}

impl RatePolicyConfig {
    /// 从应用配置构建限速策略配置
    pub fn from_settings(settings: &Settings) -> Self {
        let per_domain = settings
            .sources
            .iter()
            .map(|(name, src)| (name.clone(), src.delay_range(&settings.scraping)))
            .collect();
        Self {
            default_range: (
                settings.scraping.delay_min_secs,
                settings.scraping.delay_max_secs,
            ),
            ceiling_secs: settings.backoff.ceiling_secs,
            multiplier: settings.backoff.multiplier,
            per_domain,
        }
    }

    fn base_range(&self, domain: &str) -> (f64, f64) {
        self.per_domain
            .get(domain)
            .copied()
            .unwrap_or(self.default_range)
    }
}

/// 单个域的限速与健康状态
///
/// 进程级存活：一旦创建便不会在运行期间销毁
#[derive(Debug)]
struct DomainState {
    /// 当前间隔下限（秒）
    delay_min: f64,
    /// 当前间隔上限（秒）
    delay_max: f64,
    /// 连续失败计数
    consecutive_failures: u32,
    /// 下一次允许抓取的最早时刻
    next_slot: Option<Instant>,
}

impl DomainState {
    fn new(range: (f64, f64)) -> Self {
        Self {
            delay_min: range.0,
            delay_max: range.1.max(range.0),
            consecutive_failures: 0,
            next_slot: None,
        }
    }

    /// 在当前范围内均匀随机抽取一个间隔
    ///
    /// 永不返回固定常数，避免固定间隔被指纹识别
    fn draw_delay(&self) -> Duration {
        let secs = if self.delay_max - self.delay_min < f64::EPSILON {
            self.delay_min
        } else {
            rand::random_range(self.delay_min..=self.delay_max)
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// 按域限速与退避策略
///
/// 每个域（数据源）的间隔范围与失败计数独立维护：
/// 连续的软封锁或硬失败按倍数扩大间隔范围（受上限约束），
/// 一次成功将范围恢复为基础值并清零失败计数。
///
/// `next_delay` 在持锁期间原子性地预订下一个抓取时隙，
/// 因此多个工作器同时指向一个域时也无法绕过该域的间隔。
pub struct DomainRatePolicy {
    config: RatePolicyConfig,
    states: DashMap<String, DomainState>,
}

impl DomainRatePolicy {
    pub fn new(config: RatePolicyConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// 申请对指定域的下一次抓取，返回需要等待的时长
    ///
    /// 调用方应在锁外睡眠返回的时长后再发起请求；
    /// 时隙在本调用中已被预订，后续调用会排在其后。
    ///
    /// # 参数
    ///
    /// * `domain` - 目标域
    ///
    /// # 返回值
    ///
    /// 发起请求前需要等待的时长
    pub fn next_delay(&self, domain: &str) -> Duration {
        let now = Instant::now();
        let mut state = self
            .states
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.config.base_range(domain)));

        let wait = state
            .next_slot
            .map(|slot| slot.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);
        let spacing = state.draw_delay();
        state.next_slot = Some(now + wait + spacing);
        wait
    }

    /// 上报一次抓取结果，更新域状态
    ///
    /// # 参数
    ///
    /// * `domain` - 目标域
    /// * `outcome` - 本次抓取结果
    pub fn record_outcome(&self, domain: &str, outcome: &FetchOutcome) {
        let mut state = self
            .states
            .entry(domain.to_string())
            .or_insert_with(|| DomainState::new(self.config.base_range(domain)));

        match outcome {
            FetchOutcome::Success(_) => {
                let base = self.config.base_range(domain);
                state.delay_min = base.0;
                state.delay_max = base.1.max(base.0);
                state.consecutive_failures = 0;
            }
            FetchOutcome::SoftBlocked(_) | FetchOutcome::HardFailure(_) => {
                state.consecutive_failures += 1;
                let ceiling = self.config.ceiling_secs;
                state.delay_min = (state.delay_min * self.config.multiplier).min(ceiling);
                state.delay_max = (state.delay_max * self.config.multiplier).min(ceiling);
            }
        }

        counter!("fetch_outcomes_total", "domain" => domain.to_string(), "outcome" => outcome.label())
            .increment(1);
        gauge!("domain_delay_max_secs", "domain" => domain.to_string()).set(state.delay_max);
        gauge!("domain_consecutive_failures", "domain" => domain.to_string())
            .set(state.consecutive_failures as f64);
    }

    /// 当前间隔范围（秒），域未被触达过时返回None
    pub fn current_range(&self, domain: &str) -> Option<(f64, f64)> {
        self.states
            .get(domain)
            .map(|s| (s.delay_min, s.delay_max))
    }

    /// 当前连续失败计数
    pub fn consecutive_failures(&self, domain: &str) -> u32 {
        self.states
            .get(domain)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }
}
