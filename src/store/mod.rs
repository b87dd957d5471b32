// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 质检结果存储 (Aggregation Store)
//!
//! 三棵 sled 树:
//! - `detection_results`: 事件日志, 键 = "时间戳 序号"
//! - `defect_summary`:    日汇总, 键 = YYYY-MM-DD
//! - `defect_trends`:     月趋势, 键 = YYYY-MM
//!
//! 每次记录: 写锁内扫描已提交日志 + 新事件得到计数, 三处写入在同一事务中提交。
//! 任一写入失败则全部回滚, 汇总行始终等于日志的聚合结果。

pub mod rollup;

pub use rollup::{DailySummary, ExportRow, LogRecord, MonthlyTrend, PeriodKeys, TIMESTAMP_FORMAT};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::Transactional;
use tracing::{debug, info, warn};

use crate::detection::types::{ClassCounts, ClassificationEvent, DefectClass};
use crate::error::StoreError;

const LOG_TREE: &str = "detection_results";
const DAILY_TREE: &str = "defect_summary";
const MONTHLY_TREE: &str = "defect_trends";

/// 事务内写入阶段 (故障注入用)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(test), allow(dead_code))]
enum WriteStage {
    Log,
    Daily,
    Monthly,
}

/// 一次记录的全部写入
struct WritePlan {
    id: u64,
    log_key: String,
    log_value: Vec<u8>,
    date_key: String,
    daily_value: Vec<u8>,
    period_key: String,
    monthly_value: Vec<u8>,
}

#[derive(Clone)]
pub struct AggregationStore {
    db: sled::Db,
    log: sled::Tree,
    daily: sled::Tree,
    monthly: sled::Tree,
    /// 串行化 "扫描 + 提交", 并发写入同一日期不丢计数
    write_lock: Arc<Mutex<()>>,
}

impl AggregationStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let db = sled::open(dir)?;
        info!(path = %dir.display(), "aggregation store opened");
        Self::from_db(db)
    }

    /// 临时存储 (进程退出即删除)
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            log: db.open_tree(LOG_TREE)?,
            daily: db.open_tree(DAILY_TREE)?,
            monthly: db.open_tree(MONTHLY_TREE)?,
            db,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// 记录一个分类事件, 并重算该日期的日汇总与该月的月趋势
    ///
    /// 返回事件日志序号。返回错误时三处均未写入; 提交后的刷盘失败只记录告警。
    pub fn record(&self, event: &ClassificationEvent) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let plan = self.plan(event)?;
        self.commit(&plan, None)?;
        debug!(id = plan.id, class = %event.class, "classification recorded");
        Ok(committed(plan.id, self.db.flush()))
    }

    fn plan(&self, event: &ClassificationEvent) -> Result<WritePlan, StoreError> {
        let id = self.db.generate_id()?;
        let keys = PeriodKeys::of(&event.timestamp);
        let record = LogRecord::new(id, event);

        let (mut day, _) = self.scan_counts(&format!("{} ", keys.date))?;
        day.add(event.class);
        let (mut month, latest) = self.scan_counts(&format!("{}-", keys.period))?;
        month.add(event.class);

        // 月趋势的周字段取该月时间最晚的事件, 与 rebuild_rollups 一致
        let mut month_keys = keys.clone();
        if let Some(latest) = latest.filter(|l| l.timestamp > record.timestamp) {
            month_keys.week = latest.week;
        }

        Ok(WritePlan {
            id,
            log_key: record.key(),
            log_value: serde_json::to_vec(&record)?,
            date_key: keys.date.clone(),
            daily_value: serde_json::to_vec(&DailySummary::new(&keys, day))?,
            period_key: keys.period.clone(),
            monthly_value: serde_json::to_vec(&MonthlyTrend::new(&month_keys, month))?,
        })
    }

    /// 统计日志中某前缀下的各类别事件数, 并返回其中最晚的一条
    fn scan_counts(&self, prefix: &str) -> Result<(ClassCounts, Option<LogRecord>), StoreError> {
        let mut counts = ClassCounts::default();
        let mut latest = None;
        for item in self.log.scan_prefix(prefix.as_bytes()) {
            let (key, value) = item?;
            let record: LogRecord = decode(&key, &value)?;
            counts.add(class_of(&key, &record)?);
            latest = Some(record);
        }
        Ok((counts, latest))
    }

    fn commit(&self, plan: &WritePlan, abort_after: Option<WriteStage>) -> Result<(), StoreError> {
        (&self.log, &self.daily, &self.monthly)
            .transaction(|(log, daily, monthly)| {
                log.insert(plan.log_key.as_bytes(), plan.log_value.as_slice())?;
                abort_if(abort_after, WriteStage::Log)?;
                daily.insert(plan.date_key.as_bytes(), plan.daily_value.as_slice())?;
                abort_if(abort_after, WriteStage::Daily)?;
                monthly.insert(plan.period_key.as_bytes(), plan.monthly_value.as_slice())?;
                abort_if(abort_after, WriteStage::Monthly)?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => StoreError::Sled(e),
            })
    }

    /// 导出事件日志, 最新在前
    pub fn fetch_all(&self) -> Result<Vec<ExportRow>, StoreError> {
        self.log
            .iter()
            .rev()
            .map(|item| {
                let (key, value) = item?;
                decode::<LogRecord>(&key, &value).map(ExportRow::from)
            })
            .collect()
    }

    pub fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        let key = date.format("%Y-%m-%d").to_string();
        self.daily
            .get(key.as_bytes())?
            .map(|value| decode(key.as_bytes(), &value))
            .transpose()
    }

    /// 全部日汇总, 按日期升序
    pub fn daily_summaries(&self) -> Result<Vec<DailySummary>, StoreError> {
        decode_tree(&self.daily)
    }

    /// 月趋势, `period` 形如 "2024-03"
    pub fn monthly_trend(&self, period: &str) -> Result<Option<MonthlyTrend>, StoreError> {
        self.monthly
            .get(period.as_bytes())?
            .map(|value| decode(period.as_bytes(), &value))
            .transpose()
    }

    pub fn monthly_trends(&self) -> Result<Vec<MonthlyTrend>, StoreError> {
        decode_tree(&self.monthly)
    }

    /// 由事件日志全量重建两张汇总表, 返回重建的行数
    pub fn rebuild_rollups(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let mut days: BTreeMap<String, (PeriodKeys, ClassCounts)> = BTreeMap::new();
        let mut months: BTreeMap<String, (PeriodKeys, ClassCounts)> = BTreeMap::new();
        for item in self.log.iter() {
            let (key, value) = item?;
            let record: LogRecord = decode(&key, &value)?;
            let class = class_of(&key, &record)?;
            let timestamp = chrono::NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT)
                .map_err(|e| corrupt(&key, e))?;
            let keys = PeriodKeys::of(&timestamp);

            days.entry(keys.date.clone())
                .or_insert_with(|| (keys.clone(), ClassCounts::default()))
                .1
                .add(class);
            // 日志按时间升序, 月趋势的周字段取该月最后一个事件
            let month = months
                .entry(keys.period.clone())
                .or_insert_with(|| (keys.clone(), ClassCounts::default()));
            month.0 = keys;
            month.1.add(class);
        }

        let mut daily_rows = Vec::with_capacity(days.len());
        for (date, (keys, counts)) in &days {
            daily_rows.push((date.clone(), serde_json::to_vec(&DailySummary::new(keys, *counts))?));
        }
        let mut monthly_rows = Vec::with_capacity(months.len());
        for (period, (keys, counts)) in &months {
            monthly_rows.push((
                period.clone(),
                serde_json::to_vec(&MonthlyTrend::new(keys, *counts))?,
            ));
        }
        let stale_daily = stale_keys(&self.daily, &days)?;
        let stale_monthly = stale_keys(&self.monthly, &months)?;

        (&self.daily, &self.monthly)
            .transaction(|(daily, monthly)| {
                for key in &stale_daily {
                    daily.remove(key.as_slice())?;
                }
                for key in &stale_monthly {
                    monthly.remove(key.as_slice())?;
                }
                for (key, value) in &daily_rows {
                    daily.insert(key.as_bytes(), value.as_slice())?;
                }
                for (key, value) in &monthly_rows {
                    monthly.insert(key.as_bytes(), value.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => StoreError::Sled(e),
            })?;
        self.db.flush()?;

        let rebuilt = daily_rows.len() + monthly_rows.len();
        info!(
            daily = daily_rows.len(),
            monthly = monthly_rows.len(),
            "rollups rebuilt from event log"
        );
        Ok(rebuilt)
    }

    /// 事件日志条数
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

/// 事务已提交: 刷盘失败不回报为写入失败, 否则调用方重试会重复计数
fn committed(id: u64, flushed: sled::Result<usize>) -> u64 {
    if let Err(e) = flushed {
        warn!(id, error = %e, "flush after commit failed, record is applied");
    }
    id
}

fn abort_if(
    at: Option<WriteStage>,
    stage: WriteStage,
) -> ConflictableTransactionResult<(), StoreError> {
    if at == Some(stage) {
        return Err(ConflictableTransactionError::Abort(StoreError::Aborted(
            format!("injected failure after {:?} write", stage),
        )));
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(key: &[u8], value: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(value).map_err(|e| corrupt(key, e))
}

fn decode_tree<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>, StoreError> {
    tree.iter()
        .map(|item| {
            let (key, value) = item?;
            decode(&key, &value)
        })
        .collect()
}

fn class_of(key: &[u8], record: &LogRecord) -> Result<DefectClass, StoreError> {
    DefectClass::from_label(&record.status)
        .ok_or_else(|| corrupt(key, format!("unknown status {}", record.status)))
}

fn corrupt(key: &[u8], reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: reason.to_string(),
    }
}

/// 汇总表中存在但不再由日志产生的键
fn stale_keys<V>(tree: &sled::Tree, fresh: &BTreeMap<String, V>) -> Result<BTreeSet<Vec<u8>>, StoreError> {
    let mut stale = BTreeSet::new();
    for key in tree.iter().keys() {
        let key = key?;
        let known = std::str::from_utf8(&key).is_ok_and(|k| fresh.contains_key(k));
        if !known {
            stale.insert(key.to_vec());
        }
    }
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, NaiveTime};
    use std::thread;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_time(NaiveTime::parse_from_str(time, "%H:%M:%S").unwrap())
    }

    fn event(date: &str, time: &str, class: DefectClass) -> ClassificationEvent {
        ClassificationEvent::new(at(date, time), class)
    }

    fn day(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_single_day_rollup() {
        let store = AggregationStore::temporary().unwrap();
        store.record(&event("2024-03-01", "09:00:00", DefectClass::Intact)).unwrap();
        store.record(&event("2024-03-01", "09:00:05", DefectClass::DamagedOpen)).unwrap();
        store.record(&event("2024-03-01", "09:00:09", DefectClass::DamagedOpen)).unwrap();

        let summary = store.daily_summary(day("2024-03-01")).unwrap().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.intact, 1);
        assert_eq!(summary.damaged_deformed, 0);
        assert_eq!(summary.damaged_open, 2);
        assert_eq!(summary.month, "March");
        assert_eq!(summary.year, "2024");

        let trend = store.monthly_trend("2024-03").unwrap().unwrap();
        assert_eq!(trend.total_defects, 3);
        assert_eq!(trend.intact, 1);
        assert_eq!(trend.damaged_open, 2);
    }

    #[test]
    fn test_order_does_not_change_rollup() {
        let a = AggregationStore::temporary().unwrap();
        a.record(&event("2024-03-01", "10:00:00", DefectClass::Intact)).unwrap();
        a.record(&event("2024-03-01", "11:00:00", DefectClass::DamagedDeformed)).unwrap();

        let b = AggregationStore::temporary().unwrap();
        b.record(&event("2024-03-01", "11:00:00", DefectClass::DamagedDeformed)).unwrap();
        b.record(&event("2024-03-01", "10:00:00", DefectClass::Intact)).unwrap();

        assert_eq!(
            a.daily_summary(day("2024-03-01")).unwrap(),
            b.daily_summary(day("2024-03-01")).unwrap()
        );
        assert_eq!(a.monthly_trend("2024-03").unwrap(), b.monthly_trend("2024-03").unwrap());
    }

    #[test]
    fn test_month_equals_sum_of_days() {
        let store = AggregationStore::temporary().unwrap();
        let classes = [DefectClass::Intact, DefectClass::DamagedOpen, DefectClass::DamagedDeformed];
        for (i, date) in ["2024-03-01", "2024-03-02", "2024-03-31", "2024-04-01"].iter().enumerate() {
            for n in 0..=i {
                store.record(&event(date, "12:00:00", classes[n % 3])).unwrap();
            }
        }

        let march: u64 = store
            .daily_summaries()
            .unwrap()
            .iter()
            .filter(|s| s.date.starts_with("2024-03"))
            .map(|s| s.total)
            .sum();
        assert_eq!(march, 6);
        assert_eq!(store.monthly_trend("2024-03").unwrap().unwrap().total_defects, march);
        assert_eq!(store.monthly_trend("2024-04").unwrap().unwrap().total_defects, 4);
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn test_failed_write_applies_nothing() {
        let store = AggregationStore::temporary().unwrap();
        store.record(&event("2024-03-01", "08:00:00", DefectClass::Intact)).unwrap();

        let ev = event("2024-03-01", "08:30:00", DefectClass::DamagedOpen);
        for stage in [WriteStage::Log, WriteStage::Daily, WriteStage::Monthly] {
            let _guard = store.write_lock.lock().unwrap();
            let plan = store.plan(&ev).unwrap();
            let err = store.commit(&plan, Some(stage)).unwrap_err();
            assert!(matches!(err, StoreError::Aborted(_)));
        }

        assert_eq!(store.len(), 1);
        let summary = store.daily_summary(day("2024-03-01")).unwrap().unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.damaged_open, 0);
        assert_eq!(store.monthly_trend("2024-03").unwrap().unwrap().total_defects, 1);
    }

    #[test]
    fn test_flush_failure_after_commit_is_not_an_error() {
        let err = sled::Error::Unsupported("disk gone".to_string());
        assert_eq!(committed(7, Err(err)), 7);
        assert_eq!(committed(8, Ok(0)), 8);
    }

    #[test]
    fn test_monthly_week_follows_latest_event() {
        let store = AggregationStore::temporary().unwrap();
        store.record(&event("2024-03-20", "08:00:00", DefectClass::Intact)).unwrap();
        store.record(&event("2024-03-01", "08:00:00", DefectClass::DamagedOpen)).unwrap();

        let recorded = store.monthly_trend("2024-03").unwrap().unwrap();
        assert_eq!(recorded.week, "2024-12");
        assert_eq!(store.daily_summary(day("2024-03-01")).unwrap().unwrap().week, "2024-09");

        store.rebuild_rollups().unwrap();
        assert_eq!(store.monthly_trend("2024-03").unwrap().unwrap(), recorded);
    }

    #[test]
    fn test_concurrent_records_same_day() {
        let store = AggregationStore::temporary().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        let class = DefectClass::ALL[(t + i) % 3];
                        store.record(&event("2024-05-20", "07:00:00", class)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let summary = store.daily_summary(day("2024-05-20")).unwrap().unwrap();
        assert_eq!(summary.total, 40);
        assert_eq!(summary.intact + summary.damaged_deformed + summary.damaged_open, 40);
        assert_eq!(store.monthly_trend("2024-05").unwrap().unwrap().total_defects, 40);
    }

    #[test]
    fn test_fetch_all_newest_first() {
        let store = AggregationStore::temporary().unwrap();
        store.record(&event("2024-03-01", "08:00:00", DefectClass::Intact)).unwrap();
        store.record(&event("2024-03-02", "08:00:00", DefectClass::DamagedDeformed)).unwrap();
        store.record(&event("2024-02-28", "08:00:00", DefectClass::DamagedOpen)).unwrap();

        let rows = store.fetch_all().unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            ["2024-03-02 08:00:00", "2024-03-01 08:00:00", "2024-02-28 08:00:00"]
        );
        assert_eq!(rows[0].status, "Damaged-Deformed");
        assert_eq!(rows[0].details, "Box is deformed or punctured.");
    }

    #[test]
    fn test_rebuild_heals_rollups() {
        let store = AggregationStore::temporary().unwrap();
        store.record(&event("2024-03-01", "08:00:00", DefectClass::Intact)).unwrap();
        store.record(&event("2024-03-02", "08:00:00", DefectClass::DamagedOpen)).unwrap();

        store.daily.remove("2024-03-01").unwrap();
        store.daily.insert("1999-01-01", b"{}".as_slice()).unwrap();

        assert_eq!(store.rebuild_rollups().unwrap(), 3);
        assert_eq!(store.daily_summary(day("2024-03-01")).unwrap().unwrap().total, 1);
        assert!(store.daily.get("1999-01-01").unwrap().is_none());
        assert_eq!(store.monthly_trend("2024-03").unwrap().unwrap().total_defects, 2);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = AggregationStore::open(dir.path()).unwrap();
            store.record(&event("2024-03-01", "08:00:00", DefectClass::DamagedOpen)).unwrap();
        }
        let store = AggregationStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.daily_summary(day("2024-03-01")).unwrap().unwrap().damaged_open, 1);
    }
}
