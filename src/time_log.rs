use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::datetime::millis_between;

/// タスクの識別子。
pub type TaskId = i64;

/// プロジェクトの識別子。
pub type ProjectId = i64;

/// データプラットフォーム上のタスク。
///
/// タイマーの状態(`active_timer_start`)と累計時間(`total_time`)はタスクのレコードに保持される。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub project_id: Option<ProjectId>,
    /// 累計時間(ミリ秒)
    pub total_time: i64,
    pub active_timer_start: Option<DateTime<Utc>>,
}

impl Task {
    /// 動作中のタイマーを返す。停止している場合は`None`。
    pub fn active_timer(&self) -> Option<ActiveTimer> {
        self.active_timer_start.map(|start_time| ActiveTimer {
            task_id: self.id,
            start_time,
        })
    }

    /// 表示用のタイトルを返す。タイトルが空の場合は`Task <id>`とする。
    pub fn display_title(&self) -> String {
        if self.title.is_empty() {
            fallback_title(self.id)
        } else {
            self.title.clone()
        }
    }
}

/// タイトルが分からないタスクの表示名。
pub fn fallback_title(task_id: TaskId) -> String {
    format!("Task {}", task_id)
}

/// タスクで動作中のタイマー。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveTimer {
    pub task_id: TaskId,
    pub start_time: DateTime<Utc>,
}

impl ActiveTimer {
    /// `now`時点での経過時間をミリ秒で返す。
    pub fn elapsed_ms(&self, now: &DateTime<Utc>) -> i64 {
        millis_between(&self.start_time, now)
    }
}

/// 完了したタイマー1回分の記録。作成後は変更しない。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeLogEntry {
    /// データプラットフォームが採番したID。保存前は`None`。
    pub id: Option<i64>,
    pub task_id: TaskId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    /// 開始時刻のUTCでの日付
    pub date: NaiveDate,
}

impl TimeLogEntry {
    /// 開始時刻と終了時刻から新しい`TimeLogEntry`を作成する。
    pub fn new(task_id: TaskId, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            task_id,
            start_time,
            end_time,
            duration_ms: millis_between(&start_time, &end_time),
            date: start_time.date_naive(),
        }
    }
}

/// ミリ秒を`H:MM:SS`形式の文字列に変換する。
///
/// 1時間未満の場合は`M:SS`形式とする。負の値は0として扱う。
pub fn format_duration(millis: i64) -> String {
    let total_seconds = millis.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use rstest::rstest;

    use super::{format_duration, Task, TimeLogEntry};

    #[test]
    fn test_new_entry_duration_and_date() {
        let start = DateTime::from_timestamp_millis(1_000).unwrap();
        let end = DateTime::from_timestamp_millis(61_000).unwrap();

        let entry = TimeLogEntry::new(7, start, end);

        assert_eq!(entry.id, None);
        assert_eq!(entry.task_id, 7);
        assert_eq!(entry.duration_ms, 60_000);
        assert_eq!(entry.date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }

    /// 日付は終了時刻ではなく開始時刻から決まることを確認する。
    #[test]
    fn test_new_entry_date_crossing_midnight() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 30, 0).unwrap();

        let entry = TimeLogEntry::new(1, start, end);

        assert_eq!(entry.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(entry.duration_ms, 3_600_000);
    }

    #[test]
    fn test_active_timer() {
        let start = DateTime::from_timestamp_millis(1_000).unwrap();
        let mut task = Task {
            id: 3,
            title: "design".to_string(),
            project_id: None,
            total_time: 0,
            active_timer_start: None,
        };
        assert_eq!(task.active_timer(), None);

        task.active_timer_start = Some(start);
        let timer = task.active_timer().unwrap();

        assert_eq!(timer.task_id, 3);
        assert_eq!(timer.start_time, start);
        assert_eq!(
            timer.elapsed_ms(&DateTime::from_timestamp_millis(4_500).unwrap()),
            3_500
        );
    }

    #[rstest]
    #[case::titled("design", "design")]
    #[case::untitled("", "Task 3")]
    fn test_display_title(#[case] title: &str, #[case] expected: &str) {
        let task = Task {
            id: 3,
            title: title.to_string(),
            project_id: None,
            total_time: 0,
            active_timer_start: None,
        };

        assert_eq!(task.display_title(), expected);
    }

    #[rstest]
    #[case::zero(0, "0:00")]
    #[case::below_second(999, "0:00")]
    #[case::seconds(59_000, "0:59")]
    #[case::minutes(60_000, "1:00")]
    #[case::below_hour(3_599_000, "59:59")]
    #[case::hour(3_600_000, "1:00:00")]
    #[case::hours(37_230_000, "10:20:30")]
    #[case::negative(-5_000, "0:00")]
    fn test_format_duration(#[case] millis: i64, #[case] expected: &str) {
        assert_eq!(format_duration(millis), expected);
    }
}
