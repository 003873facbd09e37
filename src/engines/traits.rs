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
use crate::domain::models::task::CollectTask;
use async_trait::async_trait;
use thiserror::Error;

/// 引擎错误类型
///
/// 单次尝试的网络/封锁问题不走这里——它们以 `FetchOutcome`
/// 的形式返回并进入重试路径。`EngineError` 表示进程级故障
/// （如浏览器不可用），会中止整个运行。
#[derive(Error, Debug)]
pub enum EngineError {
    /// 浏览器引擎不可用
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// 引擎已关闭仍被调用
    #[error("Engine {0} already closed")]
    Closed(&'static str),

    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

/// 抓取策略特质
///
/// 三种策略（HTTP、浏览器、会话爬取）实现同一契约，调度器
/// 通过该契约统一调用，不做类型分支。实现方必须：
/// 在发起请求前向限速策略申请等待（阻塞式），并在返回前
/// 通过 `record_outcome` 上报本次结果。
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// 执行一次抓取尝试
    ///
    /// # 参数
    ///
    /// * `task` - 采集任务
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchOutcome)` - 本次尝试的结果（成功/软封锁/硬失败）
    /// * `Err(EngineError)` - 进程级故障，中止运行
    async fn fetch(&self, task: &CollectTask) -> Result<FetchOutcome, EngineError>;

    /// 释放引擎持有的资源
    ///
    /// 幂等：重复调用是安全的
    async fn close(&self);

    /// 引擎名称
    fn name(&self) -> &'static str;
}
