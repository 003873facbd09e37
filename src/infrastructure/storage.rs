// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::progress::RunReport;
use crate::domain::models::record::ProductRecord;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// 落地错误类型
#[derive(Error, Debug)]
pub enum SinkError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 记录落地特质
///
/// 编排核心把finalize后的有序记录与运行统计交给此接口，
/// 不感知下游的存储结构。
pub trait RecordSink: Send + Sync {
    /// 保存一次运行的记录与统计
    fn save(&self, records: &[ProductRecord], report: &RunReport) -> Result<(), SinkError>;
}

/// JSON文件落地
///
/// 把记录与运行报告写入输出目录下带时间戳的JSON文件
pub struct JsonFileSink {
    output_dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl RecordSink for JsonFileSink {
    fn save(&self, records: &[ProductRecord], report: &RunReport) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.output_dir.join(format!("products_{}.json", timestamp));

        let document = json!({
            "report": report,
            "records": records,
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&document)?)?;

        info!(path = %path.display(), count = records.len(), "Saved collected records");
        Ok(())
    }
}

/// 空落地实现，用于测试或只要统计输出的运行
pub struct NullSink;

impl RecordSink for NullSink {
    fn save(&self, _records: &[ProductRecord], _report: &RunReport) -> Result<(), SinkError> {
        Ok(())
    }
}
