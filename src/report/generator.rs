use crate::domain::{format_duration, TaskId, TaskStatistic};
use crate::persistence::{atomic_write, report_file, Snapshot};
use crate::report::stats::summarize_days;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Format percentage with 1 decimal place
fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Render the markdown report for one day.
///
/// `names` maps task ids to display names; unknown ids fall back to `task #id`.
pub fn render_report(
    day: NaiveDate,
    statistics: &[TaskStatistic],
    names: &HashMap<TaskId, String>,
    in_progress: bool,
) -> String {
    let mut report = String::new();

    if in_progress {
        report.push_str(&format!("# Daily Report - {} (in progress)\n\n", day));
    } else {
        report.push_str(&format!("# Daily Report - {}\n\n", day));
    }

    let own: Vec<TaskStatistic> = statistics.iter().filter(|s| s.day == day).cloned().collect();
    if own.is_empty() {
        report.push_str("No tasks recorded for this day.\n");
        return report;
    }

    if let Some(summary) = summarize_days(&own).first() {
        report.push_str("## Summary\n\n");
        report.push_str(&format!(
            "- **Tasks:** {} (Completed: {})\n",
            summary.tasks, summary.completed_tasks
        ));
        report.push_str(&format!(
            "- **Time:** {} / {} goal ({})\n\n",
            format_duration(summary.completed_ms),
            format_duration(summary.goal_ms),
            format_percent(summary.completion_percent())
        ));
    }

    let mut rows: Vec<(String, &TaskStatistic)> = own
        .iter()
        .map(|s| {
            let name = names
                .get(&s.task_id)
                .cloned()
                .unwrap_or_else(|| format!("task #{}", s.task_id));
            (name, s)
        })
        .collect();
    // Finished first, then by name
    rows.sort_by(|a, b| {
        b.1.is_completed()
            .cmp(&a.1.is_completed())
            .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
    });

    report.push_str("## Tasks\n\n");
    for (name, statistic) in rows {
        let goal_ms = statistic.goal_ms();
        if statistic.is_completed() {
            report.push_str(&format!(
                "- [x] {}: {} / {}\n",
                name,
                format_duration(statistic.completed_ms),
                format_duration(goal_ms)
            ));
        } else {
            let percent = if goal_ms > 0 {
                (statistic.completed_ms as f64 / goal_ms as f64) * 100.0
            } else {
                0.0
            };
            report.push_str(&format!(
                "- [ ] {}: {} / {} ({})\n",
                name,
                format_duration(statistic.completed_ms),
                format_duration(goal_ms),
                format_percent(percent)
            ));
        }
    }

    report
}

/// Figures for `day`: recorded statistics for a closed day, live task progress for the active one
pub fn day_statistics(snapshot: &Snapshot, day: NaiveDate) -> (Vec<TaskStatistic>, bool) {
    if snapshot.active_day == Some(day) {
        let live = snapshot
            .rollover_candidates()
            .map(|task| TaskStatistic::capture(task, day))
            .collect();
        return (live, true);
    }

    let recorded = snapshot
        .statistics
        .values()
        .filter(|s| s.day == day)
        .cloned()
        .collect();
    (recorded, false)
}

/// Write the report for `day` to `output`, or to the data directory's reports folder
pub fn generate_report(
    data_dir: &Path,
    snapshot: &Snapshot,
    day: NaiveDate,
    output: Option<PathBuf>,
) -> Result<PathBuf> {
    let (statistics, in_progress) = day_statistics(snapshot, day);
    let names: HashMap<TaskId, String> = snapshot
        .tasks
        .values()
        .map(|task| (task.id, task.name.clone()))
        .collect();

    let report = render_report(day, &statistics, &names, in_progress);

    let path = output.unwrap_or_else(|| report_file(data_dir, day));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
        }
    }
    atomic_write(&path, &report)?;

    info!(%day, path = %path.display(), in_progress, "report written");
    Ok(path)
}
