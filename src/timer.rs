use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::datetime;
use crate::error::{TimerError, TimerResult};
use crate::platform::{DataPlatform, TaskFilter, TimerStateUpdate};
use crate::store::TimeLogStore;
use crate::time_log::{ActiveTimer, Task, TaskId, TimeLogEntry};

/// タスクのタイマーを開始・停止する。
///
/// タスクごとの状態は`IDLE`と`RUNNING`の2つで、`start_timer`で`RUNNING`、`stop_timer`で`IDLE`に遷移する。
/// 同じタスクに対する`start_timer`と`stop_timer`はタスクごとのロックで直列化する。
pub struct TimerController<'a, P: DataPlatform> {
    platform: &'a P,
    locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl<'a, P: DataPlatform> TimerController<'a, P> {
    /// 新しい`TimerController`を返す。
    ///
    /// # Arguments
    /// * `platform` - タスクとタイムログを保持するデータプラットフォーム
    pub fn new(platform: &'a P) -> Self {
        Self {
            platform,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// タイマーを開始する。
    ///
    /// 既にタイマーが動作している場合は開始時刻を上書きせずに`AlreadyRunning`を返す。
    ///
    /// # Arguments
    ///
    /// * `task_id` - タイマーを開始するタスク
    pub async fn start_timer(&self, task_id: TaskId) -> TimerResult<ActiveTimer> {
        let _guard = self.lock_task(task_id).await;
        let task = self.load_task(task_id).await?;
        if let Some(started_at) = task.active_timer_start {
            warn!("Timer for task {} is already running", task_id);
            return Err(TimerError::AlreadyRunning {
                task_id,
                started_at,
            });
        }

        let start_time = datetime::now();
        self.platform
            .update_task_timer_state(task_id, TimerStateUpdate::started(start_time))
            .await
            .with_context(|| format!("Failed to start timer for task {}", task_id))?;
        info!("Timer started for task {} at {}", task_id, start_time);

        Ok(ActiveTimer {
            task_id,
            start_time,
        })
    }

    /// タイマーを停止し、作成したタイムログを返す。
    ///
    /// 経過時間をタスクの累計時間に加算し、タイムログを追記する。
    /// タイムログの追記に失敗した場合はタスクの状態を停止前に戻してからエラーを返す。
    ///
    /// # Arguments
    ///
    /// * `task_id` - タイマーを停止するタスク
    pub async fn stop_timer(&self, task_id: TaskId) -> TimerResult<TimeLogEntry> {
        let _guard = self.lock_task(task_id).await;
        let task = self.load_task(task_id).await?;
        let Some(timer) = task.active_timer() else {
            warn!("No active timer for task {}", task_id);
            return Err(TimerError::NoActiveTimer { task_id });
        };

        let entry = TimeLogEntry::new(task_id, timer.start_time, datetime::now());
        let total_time = task.total_time + entry.duration_ms;
        self.platform
            .update_task_timer_state(task_id, TimerStateUpdate::stopped(total_time))
            .await
            .with_context(|| format!("Failed to stop timer for task {}", task_id))?;

        match TimeLogStore::new(self.platform).append(entry).await {
            Ok(entry) => {
                info!(
                    "Timer stopped for task {} after {} ms, total {} ms",
                    task_id, entry.duration_ms, total_time
                );
                Ok(entry)
            }
            Err(append_error) => {
                error!("{:#}", append_error);
                self.platform
                    .update_task_timer_state(task_id, TimerStateUpdate::restore(&task))
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to restore timer state of task {} after: {:#}",
                            task_id, append_error
                        )
                    })?;
                info!("Restored timer state of task {}", task_id);
                Err(TimerError::Upstream(append_error))
            }
        }
    }

    /// `now`時点でのタスクの経過時間をミリ秒で返す。
    pub async fn elapsed_time(&self, task_id: TaskId, now: &DateTime<Utc>) -> TimerResult<i64> {
        let task = self.load_task(task_id).await?;
        Ok(elapsed_ms(&task, now))
    }

    async fn load_task(&self, task_id: TaskId) -> TimerResult<Task> {
        load_task(self.platform, task_id).await
    }

    async fn lock_task(&self, task_id: TaskId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(task_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// `now`時点での経過時間をミリ秒で返す。タイマーが停止している場合は0。
pub fn elapsed_ms(task: &Task, now: &DateTime<Utc>) -> i64 {
    task.active_timer()
        .map_or(0, |timer| timer.elapsed_ms(now))
}

/// タスクを取得する。存在しない場合は`NotFound`を返す。
pub async fn load_task<P: DataPlatform>(platform: &P, task_id: TaskId) -> TimerResult<Task> {
    let tasks = platform
        .query_tasks(TaskFilter::by_id(task_id))
        .await
        .with_context(|| format!("Failed to retrieve task {}", task_id))?;

    tasks
        .into_iter()
        .find(|task| task.id == task_id)
        .ok_or(TimerError::NotFound { task_id })
}
