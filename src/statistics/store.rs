//! # 每日流量存储

use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use entity::traffic_stats;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Serialize;
use std::sync::Arc;

/// 默认返回的历史天数
pub const DEFAULT_HISTORY_DAYS: u64 = 30;

/// 某一天的流量统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyTraffic {
    pub date: NaiveDate,
    pub download_bytes: i64,
    pub upload_bytes: i64,
    pub request_count: i64,
}

impl DailyTraffic {
    #[must_use]
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            download_bytes: 0,
            upload_bytes: 0,
            request_count: 0,
        }
    }
}

impl From<traffic_stats::Model> for DailyTraffic {
    fn from(model: traffic_stats::Model) -> Self {
        Self {
            date: model.date,
            download_bytes: model.download_bytes,
            upload_bytes: model.upload_bytes,
            request_count: model.request_count,
        }
    }
}

/// 一批累加量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficDelta {
    pub download_bytes: u64,
    pub upload_bytes: u64,
    /// 记账调用次数
    pub calls: u64,
}

impl TrafficDelta {
    pub(crate) fn absorb(&mut self, download_bytes: u64, upload_bytes: u64) {
        self.download_bytes = self.download_bytes.saturating_add(download_bytes);
        self.upload_bytes = self.upload_bytes.saturating_add(upload_bytes);
        self.calls += 1;
    }
}

/// 本地时区的今天
#[must_use]
pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// 流量存储接口
#[async_trait]
pub trait TrafficStore: Send + Sync {
    /// 今天（本地日期）的记录，不存在则创建
    async fn get_or_create_today(&self) -> Result<DailyTraffic> {
        self.get_or_create(local_today()).await
    }

    async fn get_or_create(&self, date: NaiveDate) -> Result<DailyTraffic>;

    /// 按日期写入绝对值
    async fn upsert(&self, stats: &DailyTraffic) -> Result<()>;

    /// 在指定日期上累加
    async fn apply_delta(&self, date: NaiveDate, delta: TrafficDelta) -> Result<()>;

    /// 最近若干天，日期倒序
    async fn list_recent(&self, limit: u64) -> Result<Vec<DailyTraffic>>;
}

/// 基于 sea-orm 的流量存储
#[derive(Clone)]
pub struct DbTrafficStore {
    db: Arc<DatabaseConnection>,
}

impl DbTrafficStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find(&self, date: NaiveDate) -> Result<Option<traffic_stats::Model>> {
        Ok(traffic_stats::Entity::find()
            .filter(traffic_stats::Column::Date.eq(date))
            .one(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl TrafficStore for DbTrafficStore {
    async fn get_or_create(&self, date: NaiveDate) -> Result<DailyTraffic> {
        if let Some(existing) = self.find(date).await? {
            return Ok(existing.into());
        }

        let now = chrono::Utc::now().naive_utc();
        let inserted = traffic_stats::ActiveModel {
            date: Set(date),
            download_bytes: Set(0),
            upload_bytes: Set(0),
            request_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await;

        match inserted {
            Ok(model) => Ok(model.into()),
            // 唯一索引冲突：另一个写入方刚创建了这一天
            Err(err) => self
                .find(date)
                .await?
                .map(DailyTraffic::from)
                .ok_or_else(|| ProxyError::statistics_with_source("创建当日流量记录失败", err)),
        }
    }

    async fn upsert(&self, stats: &DailyTraffic) -> Result<()> {
        self.get_or_create(stats.date).await?;
        traffic_stats::Entity::update_many()
            .col_expr(traffic_stats::Column::DownloadBytes, Expr::value(stats.download_bytes))
            .col_expr(traffic_stats::Column::UploadBytes, Expr::value(stats.upload_bytes))
            .col_expr(traffic_stats::Column::RequestCount, Expr::value(stats.request_count))
            .col_expr(
                traffic_stats::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(traffic_stats::Column::Date.eq(stats.date))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn apply_delta(&self, date: NaiveDate, delta: TrafficDelta) -> Result<()> {
        self.get_or_create(date).await?;
        traffic_stats::Entity::update_many()
            .col_expr(
                traffic_stats::Column::DownloadBytes,
                Expr::col(traffic_stats::Column::DownloadBytes).add(to_i64(delta.download_bytes)),
            )
            .col_expr(
                traffic_stats::Column::UploadBytes,
                Expr::col(traffic_stats::Column::UploadBytes).add(to_i64(delta.upload_bytes)),
            )
            .col_expr(
                traffic_stats::Column::RequestCount,
                Expr::col(traffic_stats::Column::RequestCount).add(to_i64(delta.calls)),
            )
            .col_expr(
                traffic_stats::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(traffic_stats::Column::Date.eq(date))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: u64) -> Result<Vec<DailyTraffic>> {
        let rows = traffic_stats::Entity::find()
            .order_by_desc(traffic_stats::Column::Date)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(DailyTraffic::from).collect())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::helpers::create_test_db;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = DbTrafficStore::new(Arc::new(create_test_db().await));
        let first = store.get_or_create(day(1)).await.unwrap();
        let second = store.get_or_create(day(1)).await.unwrap();
        assert_eq!(first, DailyTraffic::empty(day(1)));
        assert_eq!(first, second);
        assert_eq!(store.list_recent(DEFAULT_HISTORY_DAYS).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_delta_accumulates() {
        let store = DbTrafficStore::new(Arc::new(create_test_db().await));
        let mut delta = TrafficDelta::default();
        delta.absorb(100, 0);
        delta.absorb(50, 7);
        store.apply_delta(day(2), delta).await.unwrap();
        store.apply_delta(day(2), delta).await.unwrap();

        let stats = store.get_or_create(day(2)).await.unwrap();
        assert_eq!(stats.download_bytes, 300);
        assert_eq!(stats.upload_bytes, 14);
        assert_eq!(stats.request_count, 4);
    }

    #[tokio::test]
    async fn test_upsert_and_list_recent_newest_first() {
        let store = DbTrafficStore::new(Arc::new(create_test_db().await));
        for d in 1..=3 {
            store
                .upsert(&DailyTraffic {
                    date: day(d),
                    download_bytes: i64::from(d) * 10,
                    upload_bytes: 1,
                    request_count: 2,
                })
                .await
                .unwrap();
        }

        let recent = store.list_recent(2).await.unwrap();
        let dates: Vec<NaiveDate> = recent.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(3), day(2)]);
        assert_eq!(recent[0].download_bytes, 30);
    }
}
