use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::PlatformConfig;
use crate::datetime::parse_instant;
use crate::time_log::{ProjectId, Task, TaskId, TimeLogEntry};

#[cfg(test)]
pub mod memory;

const TASK_TABLE: &str = "task";
const TIME_LOG_TABLE: &str = "time_log";
const TASK_FIELDS: &[&str] = &[
    "Id",
    "Name",
    "title",
    "project_id",
    "total_time",
    "active_timer_start_time",
];
const TIME_LOG_FIELDS: &[&str] = &["Id", "start_time", "end_time", "duration", "date", "task_id"];

/// タスクのタイマー状態の更新内容。`None`のフィールドは更新しない。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimerStateUpdate {
    /// `Some(None)`の場合はタイマーをクリアする。
    pub active_timer_start: Option<Option<DateTime<Utc>>>,
    pub total_time: Option<i64>,
}

impl TimerStateUpdate {
    /// タイマーを開始する更新を返す。
    pub fn started(start_time: DateTime<Utc>) -> Self {
        Self {
            active_timer_start: Some(Some(start_time)),
            total_time: None,
        }
    }

    /// タイマーをクリアして累計時間を書き換える更新を返す。
    pub fn stopped(total_time: i64) -> Self {
        Self {
            active_timer_start: Some(None),
            total_time: Some(total_time),
        }
    }

    /// `task`の状態に戻す更新を返す。
    pub fn restore(task: &Task) -> Self {
        Self {
            active_timer_start: Some(task.active_timer_start),
            total_time: Some(task.total_time),
        }
    }
}

/// タイムログの検索条件。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeLogFilter {
    /// `None`の場合は全てのタスクが対象
    pub task_ids: Option<Vec<TaskId>>,
    /// この時刻より前に終了したタイムログを除外する
    pub exclude_ended_before: Option<DateTime<Utc>>,
}

impl TimeLogFilter {
    pub fn for_tasks(task_ids: Vec<TaskId>) -> Self {
        Self {
            task_ids: Some(task_ids),
            exclude_ended_before: None,
        }
    }

    pub fn ended_after(mut self, since: DateTime<Utc>) -> Self {
        self.exclude_ended_before = Some(since);
        self
    }

    /// `entry`が条件に一致するかを返す。
    pub fn matches(&self, entry: &TimeLogEntry) -> bool {
        let task_matches = self
            .task_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&entry.task_id));
        let end_matches = self
            .exclude_ended_before
            .map_or(true, |since| entry.end_time >= since);
        task_matches && end_matches
    }
}

/// タスクの検索条件。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub task_id: Option<TaskId>,
    pub project_id: Option<ProjectId>,
}

impl TaskFilter {
    pub fn by_id(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            project_id: None,
        }
    }

    pub fn by_project(project_id: ProjectId) -> Self {
        Self {
            task_id: None,
            project_id: Some(project_id),
        }
    }

    /// `task`が条件に一致するかを返す。
    pub fn matches(&self, task: &Task) -> bool {
        self.task_id.map_or(true, |id| task.id == id)
            && self.project_id.map_or(true, |id| task.project_id == Some(id))
    }
}

/// タスクとタイムログを保持するデータプラットフォーム。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataPlatform: Send + Sync {
    /// タイムログを作成し、採番されたIDを含むタイムログを返す。
    async fn create_time_log_entry(&self, entry: TimeLogEntry) -> Result<TimeLogEntry>;

    /// タスクのタイマー状態を更新する。
    async fn update_task_timer_state(&self, task_id: TaskId, update: TimerStateUpdate) -> Result<()>;

    /// 条件に一致するタイムログを開始時刻の降順で取得する。
    async fn query_time_logs(&self, filter: TimeLogFilter) -> Result<Vec<TimeLogEntry>>;

    /// 条件に一致するタスクを取得する。
    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>>;
}

/// `task`テーブルのレコード。
#[derive(Debug, Deserialize)]
struct TaskRecord {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: Option<String>,
    title: Option<String>,
    project_id: Option<i64>,
    total_time: Option<i64>,
    active_timer_start_time: Option<String>,
}

impl TaskRecord {
    fn into_task(self) -> Result<Task> {
        let active_timer_start = self
            .active_timer_start_time
            .filter(|value| !value.is_empty())
            .map(|value| parse_instant(&value))
            .transpose()
            .with_context(|| format!("Invalid active timer on task {}", self.id))?;

        Ok(Task {
            id: self.id,
            title: self.title.or(self.name).unwrap_or_default(),
            project_id: self.project_id,
            total_time: self.total_time.unwrap_or(0),
            active_timer_start,
        })
    }
}

/// `time_log`テーブルのレコード。
#[derive(Debug, Deserialize)]
struct TimeLogRecord {
    #[serde(rename = "Id")]
    id: i64,
    task_id: i64,
    start_time: String,
    end_time: Option<String>,
    duration: Option<i64>,
}

impl TimeLogRecord {
    /// 終了していないレコードは`None`を返す。
    fn into_entry(self) -> Result<Option<TimeLogEntry>> {
        let end_time = match self.end_time.filter(|value| !value.is_empty()) {
            Some(end_time) => parse_instant(&end_time)?,
            None => return Ok(None),
        };
        let start_time = parse_instant(&self.start_time)?;
        let mut entry = TimeLogEntry::new(self.task_id, start_time, end_time);
        entry.id = Some(self.id);
        if let Some(duration) = self.duration {
            entry.duration_ms = duration;
        }

        Ok(Some(entry))
    }
}

#[derive(Debug, Serialize)]
struct Condition {
    field: &'static str,
    operator: &'static str,
    values: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct OrderBy {
    field: &'static str,
    direction: &'static str,
}

/// レコード検索のリクエストボディ。
#[derive(Debug, Serialize)]
struct QueryParams {
    fields: &'static [&'static str],
    #[serde(rename = "where", skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    order_by: Vec<OrderBy>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse<T> {
    success: bool,
    message: Option<String>,
    data: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    success: bool,
    message: Option<String>,
    results: Option<Vec<MutationResult>>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    success: bool,
    message: Option<String>,
    data: Option<Value>,
}

/// データプラットフォームのレコードAPIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let config = PlatformConfig::from_env().unwrap();
/// let client = PlatformClient::new(&config);
/// let tasks = client.query_tasks(TaskFilter::by_id(1)).await.unwrap();
/// ```
pub struct PlatformClient {
    client: Client,
    api_url: String,
    project_id: String,
    public_key: String,
}

impl PlatformClient {
    /// 新しい`PlatformClient`を返す。
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            project_id: config.project_id.clone(),
            public_key: config.public_key.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_url, path))
            .basic_auth(&self.project_id, Some(&self.public_key))
            .header(CONTENT_TYPE, "application/json")
    }

    /// テーブルからレコードを検索する。
    async fn fetch_records<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &QueryParams,
    ) -> Result<Vec<T>> {
        let response = self
            .request(Method::POST, &format!("/tables/{}/records/query", table))
            .json(params)
            .send()
            .await
            .with_context(|| format!("Failed to send request to data platform at {}", self.api_url))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<FetchResponse<T>>()
            .await
            .context("Failed to deserialize response")?;
        if !response.success {
            bail!(
                "Failed to fetch {} records: {}",
                table,
                response.message.unwrap_or_default()
            );
        }

        let records = response.data.unwrap_or_default();
        debug!("Fetched {} records from {}", records.len(), table);
        Ok(records)
    }

    /// レコードを作成または更新する。
    ///
    /// レスポンス全体または個別のレコードが失敗した場合はエラーを返す。
    async fn mutate_records(
        &self,
        method: Method,
        table: &str,
        records: Vec<Value>,
    ) -> Result<Vec<MutationResult>> {
        let response = self
            .request(method.clone(), &format!("/tables/{}/records", table))
            .json(&json!({ "records": records }))
            .send()
            .await
            .with_context(|| format!("Failed to send request to data platform at {}", self.api_url))?
            .error_for_status()
            .context("Request returned an error status")?
            .json::<MutationResponse>()
            .await
            .context("Failed to deserialize response")?;
        if !response.success {
            bail!(
                "Failed to {} {} records: {}",
                method,
                table,
                response.message.unwrap_or_default()
            );
        }

        let results = response.results.unwrap_or_default();
        let failures: Vec<String> = results
            .iter()
            .filter(|result| !result.success)
            .map(|result| result.message.clone().unwrap_or_else(|| "unknown error".to_string()))
            .collect();
        if !failures.is_empty() {
            bail!(
                "Failed to {} {} of {} records: {}",
                method,
                failures.len(),
                table,
                failures.join(", ")
            );
        }

        Ok(results)
    }
}

fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl DataPlatform for PlatformClient {
    async fn create_time_log_entry(&self, entry: TimeLogEntry) -> Result<TimeLogEntry> {
        let record = json!({
            "Name": format!("Time Log for Task {}", entry.task_id),
            "start_time": format_instant(&entry.start_time),
            "end_time": format_instant(&entry.end_time),
            "duration": entry.duration_ms,
            "date": entry.date.format("%Y-%m-%d").to_string(),
            "task_id": entry.task_id,
        });
        let results = self
            .mutate_records(Method::POST, TIME_LOG_TABLE, vec![record])
            .await
            .with_context(|| format!("Failed to create time log for task {}", entry.task_id))?;

        let id = results
            .first()
            .and_then(|result| result.data.as_ref())
            .and_then(|data| data.get("Id"))
            .and_then(Value::as_i64);
        info!("Created time log {:?} for task {}", id, entry.task_id);

        Ok(TimeLogEntry { id, ..entry })
    }

    async fn update_task_timer_state(&self, task_id: TaskId, update: TimerStateUpdate) -> Result<()> {
        let mut record = Map::new();
        record.insert("Id".to_string(), json!(task_id));
        if let Some(start) = update.active_timer_start {
            record.insert(
                "active_timer_start_time".to_string(),
                start.map_or(Value::Null, |start| Value::String(format_instant(&start))),
            );
        }
        if let Some(total_time) = update.total_time {
            record.insert("total_time".to_string(), json!(total_time));
        }

        self.mutate_records(Method::PATCH, TASK_TABLE, vec![Value::Object(record)])
            .await
            .with_context(|| format!("Failed to update timer state of task {}", task_id))?;

        Ok(())
    }

    async fn query_time_logs(&self, filter: TimeLogFilter) -> Result<Vec<TimeLogEntry>> {
        let mut conditions = Vec::new();
        if let Some(task_ids) = filter.task_ids {
            let operator = if task_ids.len() == 1 { "EqualTo" } else { "ExactMatch" };
            conditions.push(Condition {
                field: "task_id",
                operator,
                values: task_ids.into_iter().map(Value::from).collect(),
            });
        }
        if let Some(since) = filter.exclude_ended_before {
            conditions.push(Condition {
                field: "end_time",
                operator: "GreaterThanOrEqualTo",
                values: vec![Value::String(format_instant(&since))],
            });
        }
        let params = QueryParams {
            fields: TIME_LOG_FIELDS,
            conditions,
            order_by: vec![OrderBy {
                field: "start_time",
                direction: "DESC",
            }],
        };

        let records: Vec<TimeLogRecord> = self
            .fetch_records(TIME_LOG_TABLE, &params)
            .await
            .context("Failed to query time logs")?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id;
            match record
                .into_entry()
                .with_context(|| format!("Invalid time log record {}", id))?
            {
                Some(entry) => entries.push(entry),
                None => debug!("Skip unfinished time log record {}", id),
            }
        }

        Ok(entries)
    }

    async fn query_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut conditions = Vec::new();
        if let Some(task_id) = filter.task_id {
            conditions.push(Condition {
                field: "Id",
                operator: "EqualTo",
                values: vec![Value::from(task_id)],
            });
        }
        if let Some(project_id) = filter.project_id {
            conditions.push(Condition {
                field: "project_id",
                operator: "EqualTo",
                values: vec![Value::from(project_id)],
            });
        }
        let params = QueryParams {
            fields: TASK_FIELDS,
            conditions,
            order_by: vec![],
        };

        let records: Vec<TaskRecord> = self
            .fetch_records(TASK_TABLE, &params)
            .await
            .context("Failed to query tasks")?;

        records.into_iter().map(TaskRecord::into_task).collect()
    }
}
