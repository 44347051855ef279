use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{ArgAction, Parser, Subcommand};
use just10::domain::{format_clock, format_duration, NewTask, Task, TaskId, TaskUpdate, Weekdays};
use just10::persistence::{get_data_dir, init_local_data_dir};
use just10::report::{summarize_days, task_history};
use just10::{App, DayEvent, StopReason, SystemClock, TimerEvent};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "just10")]
#[command(about = "A few focused minutes on every task, every day", long_about = None)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a local .just10 directory in the current directory
    Init,
    /// Add a task
    Add {
        name: String,
        /// Daily goal in minutes. Defaults to the configured goal.
        #[arg(short, long)]
        goal: Option<u32>,
        /// Days the task is scheduled: all, weekdays, weekends or e.g. mon,wed,fri
        #[arg(short, long)]
        days: Option<String>,
    },
    /// Change a task's name, goal or days
    Edit {
        id: TaskId,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        goal: Option<u32>,
        #[arg(short, long)]
        days: Option<String>,
    },
    /// List tasks with today's progress
    List {
        /// Include archived tasks
        #[arg(short, long)]
        all: bool,
    },
    /// Delete a task and its history
    Delete { id: TaskId },
    /// Hide a task from the daily list, keeping its history
    Archive { id: TaskId },
    Unarchive { id: TaskId },
    /// Zero today's progress for a task
    Reset { id: TaskId },
    /// Select the task the timer runs
    Select { id: TaskId },
    /// Run the timer on the selected (or given) task until the goal is reached or Ctrl+C
    Run { id: Option<TaskId> },
    /// Check for a new day and roll over if needed
    Check,
    /// Show per-day totals, or one task's history
    Stats {
        #[arg(short, long)]
        task: Option<TaskId>,
    },
    /// Generate a daily report
    Report {
        /// Date to generate report for (YYYY-MM-DD format). Defaults to today.
        #[arg(short, long)]
        date: Option<String>,
        /// Output file path. Defaults to <data dir>/reports/report-YYYY-MM-DD.md
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("warn,just10={}", level))),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or(Commands::List { all: false });
    if let Commands::Init = command {
        let data_dir = init_local_data_dir()?;
        println!("Initialized just10 directory: {}", data_dir.display());
        println!("just10 will now use this local directory when run from here.");
        return Ok(());
    }

    let data_dir = get_data_dir()?;
    let app = App::open(&data_dir, Arc::new(SystemClock))?;
    info!(data_dir = %data_dir.display(), "using data directory");

    if let Some(DayEvent::RolledOver(report)) = app.check_day()? {
        println!(
            "New day: saved {} task(s) for {}.",
            report.statistics_written, report.previous_day
        );
    }

    let result = run_command(&app, command).await;
    app.shutdown()?;
    result
}

async fn run_command(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Add { name, goal, days } => {
            let goal = goal.unwrap_or(app.config().default_goal_minutes);
            let mut new_task = NewTask::new(name, goal);
            if let Some(days) = days {
                new_task = new_task.with_weekdays(parse_days(&days)?);
            }
            let task = app.create_task(new_task)?;
            println!("Added #{} {} ({}m, {})", task.id, task.name, task.daily_goal_minutes, task.weekdays);
            Ok(())
        }
        Commands::Edit { id, name, goal, days } => {
            let update = TaskUpdate {
                name,
                daily_goal_minutes: goal,
                weekdays: days.as_deref().map(parse_days).transpose()?,
            };
            if update == TaskUpdate::default() {
                bail!("Nothing to change. Use --name, --goal or --days.");
            }
            let task = app.edit_task(id, update)?;
            println!("Updated #{} {} ({}m, {})", task.id, task.name, task.daily_goal_minutes, task.weekdays);
            Ok(())
        }
        Commands::List { all } => {
            list_tasks(app, all);
            Ok(())
        }
        Commands::Delete { id } => {
            if !app.delete_task(id)? {
                bail!("Task {} not found", id);
            }
            println!("Deleted #{}", id);
            Ok(())
        }
        Commands::Archive { id } => {
            let task = app.set_archived(id, true)?;
            println!("Archived #{} {}", task.id, task.name);
            Ok(())
        }
        Commands::Unarchive { id } => {
            let task = app.set_archived(id, false)?;
            println!("Restored #{} {}", task.id, task.name);
            Ok(())
        }
        Commands::Reset { id } => {
            app.reset_task(id)?;
            println!("Reset today's progress for #{}", id);
            Ok(())
        }
        Commands::Select { id } => {
            app.timer().select_task(id)?;
            println!("Selected #{}", id);
            Ok(())
        }
        Commands::Run { id } => run_timer(app, id).await,
        Commands::Check => {
            // The startup check already ran; report where things stand
            match app.day_state().active_day() {
                Some(day) => println!("Active day: {}", day),
                None => println!("No active day yet"),
            }
            Ok(())
        }
        Commands::Stats { task } => {
            show_stats(app, task)?;
            Ok(())
        }
        Commands::Report { date, output } => {
            let report_date = match date {
                Some(date_str) => NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                    .map_err(|e| anyhow::anyhow!("Invalid date format. Use YYYY-MM-DD: {}", e))?,
                None => app.today(),
            };
            let path = app.report(report_date, output)?;
            println!("Report generated: {}", path.display());
            Ok(())
        }
    }
}

fn parse_days(value: &str) -> Result<Weekdays> {
    value.parse::<Weekdays>()
        .map_err(|e| anyhow::anyhow!("Invalid --days '{}': {}", value, e))
}

fn progress_line(task: &Task) -> String {
    format!(
        "{} / {}",
        format_duration(task.time_completed_today_ms),
        format_duration(task.goal_ms())
    )
}

fn list_tasks(app: &App, include_archived: bool) {
    let today = app.today().weekday();
    let selected = app.timer().selected_task();
    let tasks: Vec<Task> = app
        .tasks()
        .all()
        .into_iter()
        .filter(|task| include_archived || !task.archived)
        .collect();

    if tasks.is_empty() {
        println!("No tasks yet. Add one with: just10 add <name>");
        return;
    }

    for task in tasks {
        let check = if task.is_completed_today() { "x" } else { " " };
        let marker = if selected == Some(task.id) { ">" } else { " " };
        let mut notes = Vec::new();
        if task.archived {
            notes.push("archived".to_string());
        } else if !task.weekdays.is_active_on(today) {
            notes.push("rest day".to_string());
        }
        if task.weekdays != Weekdays::all() {
            notes.push(task.weekdays.to_string());
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!(
            "{} [{}] #{:<3} {:<24} {} {:>3.0}%{}",
            marker,
            check,
            task.id,
            task.name,
            progress_line(&task),
            task.progress_ratio() * 100.0,
            notes
        );
    }
}

fn show_stats(app: &App, task_id: Option<TaskId>) -> Result<()> {
    let statistics = app.statistics().all();

    if let Some(task_id) = task_id {
        let task = app
            .tasks()
            .get(task_id)
            .with_context(|| format!("Task {} not found", task_id))?;
        let history = task_history(task_id, &statistics);
        println!("#{} {}", task.id, task.name);
        println!("  Days tracked:    {}", history.days_tracked);
        println!("  Days completed:  {}", history.days_completed);
        println!("  Total time:      {}", format_duration(history.total_ms));
        println!("  Current streak:  {}", history.current_streak);
        println!("  Best streak:     {}", history.best_streak);
        return Ok(());
    }

    let summaries = summarize_days(&statistics);
    if summaries.is_empty() {
        println!("No days recorded yet.");
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{}  {}/{} tasks  {} / {}  {:.1}%",
            summary.day,
            summary.completed_tasks,
            summary.tasks,
            format_duration(summary.completed_ms),
            format_duration(summary.goal_ms),
            summary.completion_percent()
        );
    }
    Ok(())
}

async fn run_timer(app: &App, id: Option<TaskId>) -> Result<()> {
    if let Some(id) = id {
        app.timer().select_task(id)?;
    }
    let Some(progress) = app.timer().progress() else {
        bail!("No task selected. Use: just10 run <id>");
    };
    if progress.task.is_completed_today() {
        println!("{} is already done for today.", progress.task.name);
        return Ok(());
    }

    let started_on = app.day_state().active_day();
    let mut timer_events = app.timer().subscribe();
    let mut background = app.spawn_background();
    if !app.timer().start() {
        bail!("Could not start the timer");
    }

    let name = progress.task.name.clone();
    println!("{}: {} left. Press Ctrl+C to stop.", name, format_clock(progress.remaining_ms()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            event = timer_events.recv() => match event {
                Ok(TimerEvent::Progress { completed_ms, goal_ms, .. }) => {
                    print!("\r{}  {}   ", name, format_clock(goal_ms.saturating_sub(completed_ms)));
                    std::io::stdout().flush()?;
                }
                Ok(TimerEvent::TaskFinished { name, .. }) => {
                    println!("\r{}  00:00   \nGoal reached for today.", name);
                    break;
                }
                Ok(TimerEvent::Stopped { task_id, .. }) => match app.stop_reason(task_id, started_on) {
                    StopReason::GoalReached => {}
                    StopReason::NewDay(day) => {
                        println!("\nNew day ({}). Today's progress starts from zero.", day);
                        break;
                    }
                    StopReason::Stopped => {
                        println!("\nTimer stopped.");
                        break;
                    }
                },
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            event = background.day_events.recv() => {
                if let Ok(DayEvent::RolledOver(report)) = event {
                    println!("\nNew day ({}). Today's progress starts from zero.", report.new_day);
                    break;
                }
            }
        }
    }

    let flushed = app.shutdown()?;
    if let Some(task) = app.tasks().get(progress.task.id) {
        println!("{}: {}", task.name, progress_line(&task));
    }
    info!(flushed_ms = flushed, "timer session ended");
    background.join().await;
    Ok(())
}
