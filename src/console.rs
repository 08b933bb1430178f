use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;

use crate::aggregator::{GlobalTimeSummary, ProjectTimeSummary, TaskTimeSummary};
use crate::time_log::{format_duration, ActiveTimer, TimeLogEntry};

/// Consoleにタイマーと集計結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 開始したタイマーを表示する。
    fn show_started(&mut self, timer: &ActiveTimer) -> Result<()>;

    /// 停止したタイマーのタイムログを表示する。
    fn show_stopped(&mut self, entry: &TimeLogEntry) -> Result<()>;

    /// タスクの状態を表示する。
    ///
    /// # Arguments
    ///
    /// * `summary` - タスクの集計結果
    /// * `elapsed` - 動作中のタイマーの経過時間(ミリ秒)
    fn show_task_status(&mut self, summary: &TaskTimeSummary, elapsed: i64) -> Result<()>;

    /// タイムログを表示する。
    fn show_time_logs(&mut self, time_logs: &[TimeLogEntry]) -> Result<()>;

    /// プロジェクトの集計結果を表示する。
    fn show_project_summary(&mut self, summary: &ProjectTimeSummary) -> Result<()>;

    /// 全体の集計結果を表示する。
    fn show_global_summary(&mut self, summary: &GlobalTimeSummary) -> Result<()>;
}

/// Markdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleMarkdownList<'a, W> {
    /// 新しい`ConsoleMarkdownList`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write_entry(&mut self, entry: &TimeLogEntry, label: Option<&str>) -> Result<()> {
        let line = format_entry(entry);
        let written = match label {
            Some(label) => writeln!(self.writer, "- {}: {}", line, label),
            None => writeln!(self.writer, "- {}", line),
        };
        written.with_context(|| format!("Failed to write time log: {:?}", entry))
    }
}

fn local_time(time: &DateTime<Utc>, format: &str) -> String {
    time.with_timezone(&Local).format(format).to_string()
}

/// タイムログ1件を`YYYY-MM-DD HH:MM ~ HH:MM (M:SS)`形式にする。
fn format_entry(entry: &TimeLogEntry) -> String {
    format!(
        "{} ~ {} ({})",
        local_time(&entry.start_time, "%Y-%m-%d %H:%M"),
        local_time(&entry.end_time, "%H:%M"),
        format_duration(entry.duration_ms)
    )
}

impl<'a, W: Write> ConsolePresenter for ConsoleMarkdownList<'a, W> {
    fn show_started(&mut self, timer: &ActiveTimer) -> Result<()> {
        writeln!(
            self.writer,
            "Timer started for task {} at {}",
            timer.task_id,
            local_time(&timer.start_time, "%Y-%m-%d %H:%M:%S")
        )
        .context("Failed to write started timer")
    }

    fn show_stopped(&mut self, entry: &TimeLogEntry) -> Result<()> {
        writeln!(self.writer, "Timer stopped for task {}", entry.task_id)
            .context("Failed to write stopped timer")?;
        self.write_entry(entry, None)
    }

    fn show_task_status(&mut self, summary: &TaskTimeSummary, elapsed: i64) -> Result<()> {
        writeln!(self.writer, "## {} ({})", summary.title, summary.task_id)
            .context("Failed to write task header")?;
        let written = match &summary.active_timer {
            Some(timer) => writeln!(
                self.writer,
                "- running: {} since {}",
                format_duration(elapsed),
                local_time(&timer.start_time, "%H:%M")
            ),
            None => writeln!(self.writer, "- idle"),
        };
        written.context("Failed to write timer state")?;
        writeln!(
            self.writer,
            "- total: {} in {} entries",
            format_duration(summary.total_time),
            summary.time_logs.len()
        )
        .context("Failed to write task total")
    }

    // time logを渡された順にlist形式で表示する。
    fn show_time_logs(&mut self, time_logs: &[TimeLogEntry]) -> Result<()> {
        time_logs
            .iter()
            .try_for_each(|entry| self.write_entry(entry, None))
    }

    fn show_project_summary(&mut self, summary: &ProjectTimeSummary) -> Result<()> {
        writeln!(
            self.writer,
            "## Project {}\n- total: {}\n- active timers: {}\n- entries: {}",
            summary.project_id,
            format_duration(summary.total_time),
            summary.active_timers,
            summary.total_entries
        )
        .context("Failed to write project summary")?;
        if summary.recent_logs.is_empty() {
            return Ok(());
        }

        writeln!(self.writer, "### Recent").context("Failed to write recent header")?;
        summary
            .recent_logs
            .iter()
            .try_for_each(|log| self.write_entry(&log.entry, Some(log.task_title.as_str())))
    }

    fn show_global_summary(&mut self, summary: &GlobalTimeSummary) -> Result<()> {
        writeln!(
            self.writer,
            "## All tasks\n- total: {}\n- active timers: {}\n- entries: {}",
            format_duration(summary.total_time),
            summary.active_timers,
            summary.total_entries
        )
        .context("Failed to write global summary")?;

        for item in &summary.task_breakdown {
            let marker = if item.has_active_timer { " *" } else { "" };
            writeln!(
                self.writer,
                "  - {}{}: {} ({} entries)",
                item.task_title,
                marker,
                format_duration(item.total_time),
                item.entry_count
            )
            .with_context(|| format!("Failed to write breakdown of task {}", item.task_id))?;
        }

        Ok(())
    }
}

/// JSON形式で表示する。
pub struct ConsoleJson<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleJson<'a, W> {
    /// 新しい`ConsoleJson`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut *self.writer, value).context("Failed to write json")?;
        writeln!(self.writer).context("Failed to write newline")
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleJson<'a, W> {
    fn show_started(&mut self, timer: &ActiveTimer) -> Result<()> {
        self.write_json(timer)
    }

    fn show_stopped(&mut self, entry: &TimeLogEntry) -> Result<()> {
        self.write_json(entry)
    }

    fn show_task_status(&mut self, summary: &TaskTimeSummary, elapsed: i64) -> Result<()> {
        self.write_json(&json!({ "summary": summary, "elapsed": elapsed }))
    }

    fn show_time_logs(&mut self, time_logs: &[TimeLogEntry]) -> Result<()> {
        self.write_json(time_logs)
    }

    fn show_project_summary(&mut self, summary: &ProjectTimeSummary) -> Result<()> {
        self.write_json(summary)
    }

    fn show_global_summary(&mut self, summary: &GlobalTimeSummary) -> Result<()> {
        self.write_json(summary)
    }
}
