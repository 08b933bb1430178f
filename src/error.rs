use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::time_log::TaskId;

/// タイマー操作と集計で発生するエラー。
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Timer for task {task_id} is already running since {started_at}")]
    AlreadyRunning {
        task_id: TaskId,
        started_at: DateTime<Utc>,
    },

    #[error("No active timer for task {task_id}")]
    NoActiveTimer { task_id: TaskId },

    #[error("Task {task_id} not found")]
    NotFound { task_id: TaskId },

    #[error("Data platform request failed: {0:#}")]
    Upstream(anyhow::Error),
}

impl From<anyhow::Error> for TimerError {
    fn from(error: anyhow::Error) -> Self {
        TimerError::Upstream(error)
    }
}

pub type TimerResult<T> = std::result::Result<T, TimerError>;
