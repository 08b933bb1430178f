use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;

use crate::platform::{DataPlatform, TimeLogFilter};
use crate::time_log::{TaskId, TimeLogEntry};

/// 完了したタイムログの追記専用の台帳。
///
/// 取得結果は常に開始時刻の降順で返す。開始時刻が同じ場合はデータプラットフォームの順序を保つ。
pub struct TimeLogStore<'a, P: DataPlatform> {
    platform: &'a P,
}

impl<'a, P: DataPlatform> TimeLogStore<'a, P> {
    /// 新しい`TimeLogStore`を返す。
    ///
    /// # Arguments
    /// * `platform` - タイムログを保持するデータプラットフォーム
    pub fn new(platform: &'a P) -> Self {
        Self { platform }
    }

    /// タイムログを追記する。
    pub async fn append(&self, entry: TimeLogEntry) -> Result<TimeLogEntry> {
        let task_id = entry.task_id;
        self.platform
            .create_time_log_entry(entry)
            .await
            .with_context(|| format!("Failed to append time log for task {}", task_id))
    }

    /// タスクのタイムログを新しい順に取得する。
    pub async fn query_by_task(&self, task_id: TaskId) -> Result<Vec<TimeLogEntry>> {
        self.query(TimeLogFilter::for_tasks(vec![task_id])).await
    }

    /// 複数タスクのタイムログを新しい順に取得する。
    ///
    /// `task_ids`が空の場合はデータプラットフォームに問い合わせずに空を返す。
    pub async fn query_by_tasks(&self, task_ids: &[TaskId]) -> Result<Vec<TimeLogEntry>> {
        if task_ids.is_empty() {
            return Ok(vec![]);
        }
        self.query(TimeLogFilter::for_tasks(task_ids.to_vec())).await
    }

    /// `since`以降に終了したタイムログを新しい順に取得する。
    pub async fn query_since(
        &self,
        task_ids: &[TaskId],
        since: DateTime<Utc>,
    ) -> Result<Vec<TimeLogEntry>> {
        if task_ids.is_empty() {
            return Ok(vec![]);
        }
        self.query(TimeLogFilter::for_tasks(task_ids.to_vec()).ended_after(since))
            .await
    }

    /// 全てのタイムログを新しい順に取得する。
    pub async fn query_all(&self) -> Result<Vec<TimeLogEntry>> {
        self.query(TimeLogFilter::default()).await
    }

    async fn query(&self, filter: TimeLogFilter) -> Result<Vec<TimeLogEntry>> {
        let mut entries = self
            .platform
            .query_time_logs(filter.clone())
            .await
            .context("Failed to retrieve time logs")?;
        entries.retain(|entry| filter.matches(entry));
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        debug!("Retrieved {} time logs", entries.len());

        Ok(entries)
    }
}
