use anyhow::{Context, Result};
use log::info;

use crate::aggregator::{Aggregator, TaskTimeSummary};
use crate::datetime;
use crate::platform::DataPlatform;
use crate::time_log::{ActiveTimer, TaskId, TimeLogEntry};
use crate::timer::TimerController;

/// タスクを指定するサブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct TaskArgs {
    #[clap(value_name = "TASK_ID", help = "Id of the task")]
    task_id: TaskId,
}

/// `start`、`stop`、`status`サブコマンドの処理を行う。
pub struct TimerCommand<'a, T: DataPlatform> {
    controller: TimerController<'a, T>,
    aggregator: Aggregator<'a, T>,
}

impl<'a, T: DataPlatform> TimerCommand<'a, T> {
    /// 新しい`TimerCommand`を返す。
    ///
    /// # Arguments
    /// * `platform` - データプラットフォームと通信するためのクライアント
    pub fn new(platform: &'a T) -> Self {
        Self {
            controller: TimerController::new(platform),
            aggregator: Aggregator::new(platform),
        }
    }

    /// `start`サブコマンドの処理を行う。
    pub async fn start(&self, args: TaskArgs) -> Result<ActiveTimer> {
        let timer = self
            .controller
            .start_timer(args.task_id)
            .await
            .with_context(|| format!("Failed to start timer for task {}", args.task_id))?;

        Ok(timer)
    }

    /// `stop`サブコマンドの処理を行う。
    pub async fn stop(&self, args: TaskArgs) -> Result<TimeLogEntry> {
        let entry = self
            .controller
            .stop_timer(args.task_id)
            .await
            .with_context(|| format!("Failed to stop timer for task {}", args.task_id))?;

        Ok(entry)
    }

    /// `status`サブコマンドの処理を行う。
    ///
    /// タスクの集計結果と、現在時刻での動作中のタイマーの経過時間を返す。
    pub async fn status(&self, args: TaskArgs) -> Result<(TaskTimeSummary, i64)> {
        let summary = self
            .aggregator
            .summarize_task(args.task_id)
            .await
            .with_context(|| format!("Failed to summarize task {}", args.task_id))?;
        let elapsed = self
            .controller
            .elapsed_time(args.task_id, &datetime::now())
            .await
            .with_context(|| format!("Failed to get elapsed time of task {}", args.task_id))?;
        info!("Status of task {} retrieved successfully.", args.task_id);

        Ok((summary, elapsed))
    }
}
