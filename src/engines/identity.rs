// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use rand::Rng;

/// 一次请求使用的浏览器身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestIdentity {
    /// User-Agent
    pub user_agent: &'static str,
    /// Accept-Language
    pub accept_language: &'static str,
}

const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const ACCEPT_LANGUAGES: [&str; 4] = [
    "en-US,en;q=0.9",
    "en-US,en;q=0.8",
    "en-GB,en-US;q=0.9,en;q=0.8",
    "en-US,en;q=0.9,de;q=0.7",
];

/// 请求身份池
///
/// 为每次抓取尝试随机分配身份，并保证同一域的连续两次
/// 请求不会使用相同的User-Agent。
pub struct IdentityPool {
    last_used: DashMap<String, usize>,
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityPool {
    pub fn new() -> Self {
        Self {
            last_used: DashMap::new(),
        }
    }

    /// 为指定域分配下一次请求的身份
    pub fn next_for(&self, domain: &str) -> RequestIdentity {
        let mut rng = rand::rng();
        let mut entry = self.last_used.entry(domain.to_string()).or_insert(usize::MAX);

        let mut index = rng.random_range(0..USER_AGENTS.len());
        if index == *entry {
            index = (index + 1 + rng.random_range(0..USER_AGENTS.len() - 1)) % USER_AGENTS.len();
        }
        *entry = index;

        RequestIdentity {
            user_agent: USER_AGENTS[index],
            accept_language: ACCEPT_LANGUAGES[rng.random_range(0..ACCEPT_LANGUAGES.len())],
        }
    }
}
