//! テスト用のメモリ上のデータプラットフォーム。

use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{DataPlatform, TaskFilter, TimeLogFilter, TimerStateUpdate};
use crate::time_log::{Task, TaskId, TimeLogEntry};

struct MemoryState {
    tasks: Vec<Task>,
    logs: Vec<TimeLogEntry>,
    next_log_id: i64,
}

/// タスクとタイムログを追加順に保持する`DataPlatform`。
///
/// 各操作の前に`yield_now`するため、並行に呼び出した操作は交互に実行される。
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
}

impl MemoryPlatform {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                tasks,
                logs: vec![],
                next_log_id: 1,
            }),
        }
    }

    /// タイムログを保存済みの状態で追加する。
    pub fn with_logs(self, logs: Vec<TimeLogEntry>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for mut entry in logs {
                entry.id = Some(state.next_log_id);
                state.next_log_id += 1;
                state.logs.push(entry);
            }
        }
        self
    }

    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        let state = self.state.lock().unwrap();
        state.tasks.iter().find(|task| task.id == task_id).cloned()
    }

    pub fn logs(&self) -> Vec<TimeLogEntry> {
        self.state.lock().unwrap().logs.clone()
    }
}

/// テスト用のタスクを作成する。
pub fn task(id: TaskId, title: &str, project_id: Option<i64>) -> Task {
    Task {
        id,
        title: title.to_string(),
        project_id,
        total_time: 0,
        active_timer_start: None,
    }
}

#[async_trait]
impl DataPlatform for MemoryPlatform {
    async fn create_time_log_entry(&self, mut entry: TimeLogEntry) -> Result<TimeLogEntry> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        entry.id = Some(state.next_log_id);
        state.next_log_id += 1;
        state.logs.push(entry.clone());
        Ok(entry)
    }

    async fn update_task_timer_state(&self, task_id: TaskId, update: TimerStateUpdate) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        let Some(task) = state.tasks.iter_mut().find(|task| task.id == task_id) else {
            bail!("task {} not found", task_id);
        };
        if let Some(start) = update.active_timer_start {
            task.active_timer_start = start;
        }
        if let Some(total_time) = update.total_time {
            task.total_time = total_time;
        }
        Ok(())
    }

    async fn query_time_logs(&self, filter: TimeLogFilter) -> Result<Vec<TimeLogEntry>> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect())
    }
}
