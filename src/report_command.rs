use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;

use crate::aggregator::{Aggregator, GlobalTimeSummary, ProjectTimeSummary};
use crate::datetime::parse_date;
use crate::platform::DataPlatform;
use crate::store::TimeLogStore;
use crate::time_log::{ProjectId, TaskId, TimeLogEntry};
use crate::timer::load_task;

/// `logs`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct LogsArgs {
    #[clap(value_name = "TASK_ID", help = "Id of the task")]
    task_id: TaskId,

    #[clap(
        short = 's',
        long = "since",
        help = "Only show time logs ended on or after the date in the format YYYY-MM-DD",
        parse(try_from_str = parse_date),
    )]
    since: Option<DateTime<Utc>>,
}

/// `project`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ProjectArgs {
    #[clap(value_name = "PROJECT_ID", help = "Id of the project")]
    project_id: ProjectId,
}

/// `logs`、`project`、`summary`サブコマンドの処理を行う。
pub struct ReportCommand<'a, T: DataPlatform> {
    platform: &'a T,
    aggregator: Aggregator<'a, T>,
}

impl<'a, T: DataPlatform> ReportCommand<'a, T> {
    /// 新しい`ReportCommand`を返す。
    ///
    /// # Arguments
    /// * `platform` - データプラットフォームと通信するためのクライアント
    pub fn new(platform: &'a T) -> Self {
        Self {
            platform,
            aggregator: Aggregator::new(platform),
        }
    }

    /// `logs`サブコマンドの処理を行う。
    ///
    /// 日付が指定された場合は、Localタイムゾーンでのその日の00:00:00以降に終了したタイムログのみを返す。
    pub async fn logs(&self, args: LogsArgs) -> Result<Vec<TimeLogEntry>> {
        load_task(self.platform, args.task_id)
            .await
            .with_context(|| format!("Failed to retrieve task {}", args.task_id))?;

        let store = TimeLogStore::new(self.platform);
        let time_logs = match args.since {
            Some(since) => {
                info!("Since: {}", since);
                store.query_since(&[args.task_id], since).await
            }
            None => store.query_by_task(args.task_id).await,
        }
        .with_context(|| format!("Failed to retrieve time logs of task {}", args.task_id))?;
        info!("Time logs retrieved successfully.");

        Ok(time_logs)
    }

    /// `project`サブコマンドの処理を行う。
    pub async fn project(&self, args: ProjectArgs) -> Result<ProjectTimeSummary> {
        let summary = self
            .aggregator
            .summarize_project(args.project_id)
            .await
            .with_context(|| format!("Failed to summarize project {}", args.project_id))?;

        Ok(summary)
    }

    /// `summary`サブコマンドの処理を行う。
    pub async fn summary(&self) -> Result<GlobalTimeSummary> {
        let summary = self
            .aggregator
            .summarize_all()
            .await
            .context("Failed to summarize all tasks")?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Local, TimeZone};
    use rstest::rstest;

    use super::{LogsArgs, ProjectArgs, ReportCommand};
    use crate::platform::memory::{task, MemoryPlatform};
    use crate::time_log::TimeLogEntry;

    fn entry(task_id: i64, start: DateTime<chrono::Utc>, minutes: i64) -> TimeLogEntry {
        TimeLogEntry::new(task_id, start, start + chrono::Duration::minutes(minutes))
    }

    fn platform() -> MemoryPlatform {
        let day1 = Local.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap().to_utc();
        let day2 = Local.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap().to_utc();
        MemoryPlatform::new(vec![task(1, "design", Some(10)), task(2, "build", Some(10))])
            .with_logs(vec![entry(1, day1, 30), entry(1, day2, 15), entry(2, day2, 60)])
    }

    #[rstest]
    #[case::all(None, 2)]
    #[case::since_day2(Some(Local.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap().to_utc()), 1)]
    #[case::since_future(Some(Local.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap().to_utc()), 0)]
    #[tokio::test]
    async fn test_logs(#[case] since: Option<DateTime<chrono::Utc>>, #[case] expected: usize) {
        let platform = platform();
        let command = ReportCommand::new(&platform);

        let time_logs = command.logs(LogsArgs { task_id: 1, since }).await.unwrap();

        assert_eq!(time_logs.len(), expected);
        assert!(time_logs.iter().all(|entry| entry.task_id == 1));
    }

    #[tokio::test]
    async fn test_logs_unknown_task() {
        let platform = platform();
        let command = ReportCommand::new(&platform);

        let result = command.logs(LogsArgs { task_id: 9, since: None }).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_project_and_summary() {
        let platform = platform();
        let command = ReportCommand::new(&platform);

        let project = command.project(ProjectArgs { project_id: 10 }).await.unwrap();
        assert_eq!(project.total_time, 105 * 60_000);
        assert_eq!(project.total_entries, 3);

        let summary = command.summary().await.unwrap();
        let order: Vec<i64> = summary
            .task_breakdown
            .iter()
            .map(|item| item.task_id)
            .collect();
        assert_eq!(order, vec![2, 1]);
    }
}
