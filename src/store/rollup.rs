// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 汇总表行结构与周期键
//!
//! 汇总行总是由事件日志全量重算得到, 不做增量累加。

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::detection::types::{ClassCounts, ClassificationEvent};

/// 事件时间戳格式 (本地时间, 秒精度)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 时间戳派生的周期键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodKeys {
    /// YYYY-MM-DD
    pub date: String,
    /// YYYY-MM
    pub period: String,
    pub year: String,
    /// 月份全称 (March)
    pub month: String,
    /// YYYY-WW (周一为一周起点)
    pub week: String,
}

impl PeriodKeys {
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self {
            date: timestamp.format("%Y-%m-%d").to_string(),
            period: timestamp.format("%Y-%m").to_string(),
            year: timestamp.format("%Y").to_string(),
            month: timestamp.format("%B").to_string(),
            week: timestamp.format("%Y-%W").to_string(),
        }
    }
}

/// 事件日志行 (detection_results)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: u64,
    pub timestamp: String,
    pub year: String,
    pub month: String,
    pub week: String,
    pub status: String,
    pub details: String,
}

impl LogRecord {
    pub fn new(id: u64, event: &ClassificationEvent) -> Self {
        let keys = PeriodKeys::of(&event.timestamp);
        Self {
            id,
            timestamp: event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            year: keys.year,
            month: keys.month,
            week: keys.week,
            status: event.class.label().to_string(),
            details: event.details.clone(),
        }
    }

    /// 日志键: 时间戳 + 序号, 字节序即时间序
    pub fn key(&self) -> String {
        format!("{} {:020}", self.timestamp, self.id)
    }
}

/// 导出行 (timestamp, status, details)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub timestamp: String,
    pub status: String,
    pub details: String,
}

impl From<LogRecord> for ExportRow {
    fn from(record: LogRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            status: record.status,
            details: record.details,
        }
    }
}

/// 日汇总 (defect_summary)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: String,
    pub year: String,
    pub month: String,
    pub week: String,
    pub total: u64,
    pub intact: u64,
    pub damaged_deformed: u64,
    pub damaged_open: u64,
}

impl DailySummary {
    pub fn new(keys: &PeriodKeys, counts: ClassCounts) -> Self {
        Self {
            date: keys.date.clone(),
            year: keys.year.clone(),
            month: keys.month.clone(),
            week: keys.week.clone(),
            total: counts.total(),
            intact: counts.intact,
            damaged_deformed: counts.damaged_deformed,
            damaged_open: counts.damaged_open,
        }
    }
}

/// 月趋势 (defect_trends)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    pub period: String,
    pub year: String,
    pub month: String,
    pub week: String,
    pub total_defects: u64,
    pub intact: u64,
    pub damaged_deformed: u64,
    pub damaged_open: u64,
}

impl MonthlyTrend {
    pub fn new(keys: &PeriodKeys, counts: ClassCounts) -> Self {
        Self {
            period: keys.period.clone(),
            year: keys.year.clone(),
            month: keys.month.clone(),
            week: keys.week.clone(),
            total_defects: counts.total(),
            intact: counts.intact,
            damaged_deformed: counts.damaged_deformed,
            damaged_open: counts.damaged_open,
        }
    }
}
