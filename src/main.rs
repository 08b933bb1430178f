use std::io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod aggregator;
mod config;
mod console;
mod datetime;
mod error;
mod logging;
mod platform;
mod report_command;
mod store;
mod time_log;
mod timer;
mod timer_command;

use config::PlatformConfig;
use console::{ConsoleJson, ConsoleMarkdownList, ConsolePresenter};
use platform::PlatformClient;
use report_command::{LogsArgs, ProjectArgs, ReportCommand};
use timer_command::{TaskArgs, TimerCommand};

/// タスクのタイマーを操作し、作業時間を集計するCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- start 12
/// $ cargo run -- stop 12
/// $ cargo run -- project 3
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(short, long, global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(long, global = true, help = "Print results as JSON")]
    json: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Start the timer of a task
    Start(TaskArgs),
    /// Stop the timer of a task and record the time log
    Stop(TaskArgs),
    /// Show the timer state and total time of a task
    Status(TaskArgs),
    /// Show the time logs of a task
    Logs(LogsArgs),
    /// Show the time summary of a project
    Project(ProjectArgs),
    /// Show the time summary of all tasks
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::setup_logger(args.verbose)?;

    let config = PlatformConfig::from_env().context("Failed to load configuration")?;
    let client = PlatformClient::new(&config);
    let mut stdout = io::stdout().lock();
    let mut presenter: Box<dyn ConsolePresenter + '_> = if args.json {
        Box::new(ConsoleJson::new(&mut stdout))
    } else {
        Box::new(ConsoleMarkdownList::new(&mut stdout))
    };

    match args.subcommand {
        SubCommands::Start(task) => {
            let timer = TimerCommand::new(&client).start(task).await?;
            presenter.show_started(&timer)?;
        }
        SubCommands::Stop(task) => {
            let entry = TimerCommand::new(&client).stop(task).await?;
            presenter.show_stopped(&entry)?;
        }
        SubCommands::Status(task) => {
            let (summary, elapsed) = TimerCommand::new(&client).status(task).await?;
            presenter.show_task_status(&summary, elapsed)?;
        }
        SubCommands::Logs(logs) => {
            let time_logs = ReportCommand::new(&client).logs(logs).await?;
            presenter.show_time_logs(&time_logs)?;
        }
        SubCommands::Project(project) => {
            let summary = ReportCommand::new(&client).project(project).await?;
            presenter.show_project_summary(&summary)?;
        }
        SubCommands::Summary => {
            let summary = ReportCommand::new(&client).summary().await?;
            presenter.show_global_summary(&summary)?;
        }
    }

    Ok(())
}
