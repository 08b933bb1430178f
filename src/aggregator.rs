use std::collections::HashMap;

use anyhow::Context;
use log::info;
use serde::Serialize;

use crate::error::TimerResult;
use crate::platform::{DataPlatform, TaskFilter};
use crate::store::TimeLogStore;
use crate::time_log::{fallback_title, ActiveTimer, ProjectId, Task, TaskId, TimeLogEntry};
use crate::timer::load_task;

/// プロジェクトの集計に含める直近のタイムログの件数。
pub const RECENT_LOG_LIMIT: usize = 10;

/// タスクごとの集計結果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskTimeSummary {
    pub task_id: TaskId,
    pub title: String,
    pub total_time: i64,
    pub active_timer: Option<ActiveTimer>,
    /// 新しい順
    pub time_logs: Vec<TimeLogEntry>,
}

/// タスクのタイトルを付与したタイムログ。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TitledTimeLogEntry {
    #[serde(flatten)]
    pub entry: TimeLogEntry,
    pub task_title: String,
}

/// プロジェクトごとの集計結果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectTimeSummary {
    pub project_id: ProjectId,
    pub total_time: i64,
    pub active_timers: usize,
    pub total_entries: usize,
    /// 新しい順に最大`RECENT_LOG_LIMIT`件
    pub recent_logs: Vec<TitledTimeLogEntry>,
}

/// 全体集計におけるタスク1件分の内訳。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskBreakdown {
    pub task_id: TaskId,
    pub task_title: String,
    pub project_id: Option<ProjectId>,
    pub total_time: i64,
    pub has_active_timer: bool,
    pub entry_count: usize,
}

/// 全体の集計結果。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GlobalTimeSummary {
    pub total_time: i64,
    pub active_timers: usize,
    pub total_entries: usize,
    /// 累計時間の降順。同じ場合は追加順
    pub task_breakdown: Vec<TaskBreakdown>,
}

/// タイムログとタスクのタイマー状態から集計結果を作成する。読み取りのみを行う。
pub struct Aggregator<'a, P: DataPlatform> {
    platform: &'a P,
    store: TimeLogStore<'a, P>,
}

impl<'a, P: DataPlatform> Aggregator<'a, P> {
    /// 新しい`Aggregator`を返す。
    pub fn new(platform: &'a P) -> Self {
        Self {
            platform,
            store: TimeLogStore::new(platform),
        }
    }

    /// タスクの集計結果を返す。
    ///
    /// # Arguments
    ///
    /// * `task_id` - 集計するタスク
    pub async fn summarize_task(&self, task_id: TaskId) -> TimerResult<TaskTimeSummary> {
        let task = load_task(self.platform, task_id).await?;
        let time_logs = self.store.query_by_task(task_id).await?;

        Ok(TaskTimeSummary {
            task_id,
            title: task.display_title(),
            total_time: sum_durations(&time_logs),
            active_timer: task.active_timer(),
            time_logs,
        })
    }

    /// プロジェクトに属するタスクの集計結果を返す。
    ///
    /// タスクがないプロジェクトはタイムログを取得せずに0件として返す。
    ///
    /// # Arguments
    ///
    /// * `project_id` - 集計するプロジェクト
    pub async fn summarize_project(&self, project_id: ProjectId) -> TimerResult<ProjectTimeSummary> {
        let filter = TaskFilter::by_project(project_id);
        let tasks = self
            .platform
            .query_tasks(filter.clone())
            .await
            .with_context(|| format!("Failed to retrieve tasks of project {}", project_id))?;
        let tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect();
        let task_ids: Vec<TaskId> = tasks.iter().map(|task| task.id).collect();
        let time_logs = self.store.query_by_tasks(&task_ids).await?;
        info!(
            "Project {} has {} tasks and {} time logs",
            project_id,
            tasks.len(),
            time_logs.len()
        );

        let titles: HashMap<TaskId, String> = tasks
            .iter()
            .map(|task| (task.id, task.display_title()))
            .collect();
        let recent_logs = time_logs
            .iter()
            .take(RECENT_LOG_LIMIT)
            .map(|entry| TitledTimeLogEntry {
                entry: entry.clone(),
                task_title: titles
                    .get(&entry.task_id)
                    .cloned()
                    .unwrap_or_else(|| fallback_title(entry.task_id)),
            })
            .collect();

        Ok(ProjectTimeSummary {
            project_id,
            total_time: sum_durations(&time_logs),
            active_timers: count_active(&tasks),
            total_entries: time_logs.len(),
            recent_logs,
        })
    }

    /// 全てのタスクの集計結果を返す。
    ///
    /// 内訳はタイムログまたは動作中のタイマーがあるタスクのみを含む。
    pub async fn summarize_all(&self) -> TimerResult<GlobalTimeSummary> {
        let time_logs = self.store.query_all().await?;
        let tasks = self
            .platform
            .query_tasks(TaskFilter::default())
            .await
            .context("Failed to retrieve tasks")?;
        info!(
            "Summarizing {} time logs over {} tasks",
            time_logs.len(),
            tasks.len()
        );

        Ok(GlobalTimeSummary {
            total_time: sum_durations(&time_logs),
            active_timers: count_active(&tasks),
            total_entries: time_logs.len(),
            task_breakdown: build_breakdown(&tasks, &time_logs),
        })
    }
}

fn sum_durations(time_logs: &[TimeLogEntry]) -> i64 {
    time_logs.iter().map(|entry| entry.duration_ms).sum()
}

fn count_active(tasks: &[Task]) -> usize {
    tasks
        .iter()
        .filter(|task| task.active_timer_start.is_some())
        .count()
}

/// タスクごとの内訳を作成する。
///
/// タスク一覧の順に追加し、タスク一覧にないタスクのタイムログはその後に追加する。
/// ソートは安定ソートなので、累計時間が同じ場合は追加順となる。
fn build_breakdown(tasks: &[Task], time_logs: &[TimeLogEntry]) -> Vec<TaskBreakdown> {
    let mut breakdown: Vec<TaskBreakdown> = tasks
        .iter()
        .map(|task| TaskBreakdown {
            task_id: task.id,
            task_title: task.display_title(),
            project_id: task.project_id,
            total_time: 0,
            has_active_timer: task.active_timer_start.is_some(),
            entry_count: 0,
        })
        .collect();
    let mut index: HashMap<TaskId, usize> = breakdown
        .iter()
        .enumerate()
        .map(|(i, item)| (item.task_id, i))
        .collect();

    for entry in time_logs {
        let i = *index.entry(entry.task_id).or_insert_with(|| {
            breakdown.push(TaskBreakdown {
                task_id: entry.task_id,
                task_title: fallback_title(entry.task_id),
                project_id: None,
                total_time: 0,
                has_active_timer: false,
                entry_count: 0,
            });
            breakdown.len() - 1
        });
        breakdown[i].total_time += entry.duration_ms;
        breakdown[i].entry_count += 1;
    }

    breakdown.retain(|item| item.entry_count > 0 || item.has_active_timer);
    breakdown.sort_by(|a, b| b.total_time.cmp(&a.total_time));
    breakdown
}
