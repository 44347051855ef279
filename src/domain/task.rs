use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric task identity, generated by the task store and never reused
pub type TaskId = i64;

/// Milliseconds in one minute
pub const MS_PER_MINUTE: u64 = 60_000;

/// Which days of the week a task is active on (Monday first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weekdays([bool; 7]);

impl Weekdays {
    /// Active every day
    pub fn all() -> Self {
        Self([true; 7])
    }

    /// Not active on any day
    pub fn none() -> Self {
        Self([false; 7])
    }

    /// Monday to Friday
    pub fn workdays() -> Self {
        Self([true, true, true, true, true, false, false])
    }

    /// Saturday and Sunday
    pub fn weekends() -> Self {
        Self([false, false, false, false, false, true, true])
    }

    pub fn from_flags(flags: [bool; 7]) -> Self {
        Self(flags)
    }

    pub fn flags(&self) -> [bool; 7] {
        self.0
    }

    pub fn is_active_on(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_monday() as usize]
    }

    pub fn set(&mut self, day: Weekday, active: bool) {
        self.0[day.num_days_from_monday() as usize] = active;
    }
}

impl Default for Weekdays {
    fn default() -> Self {
        Self::all()
    }
}

const DAY_NAMES: [(&str, Weekday); 7] = [
    ("mon", Weekday::Mon),
    ("tue", Weekday::Tue),
    ("wed", Weekday::Wed),
    ("thu", Weekday::Thu),
    ("fri", Weekday::Fri),
    ("sat", Weekday::Sat),
    ("sun", Weekday::Sun),
];

/// Parses "all", "weekdays", "weekends" or a comma-separated list such as "mon,wed,fri"
impl FromStr for Weekdays {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "daily" => return Ok(Self::all()),
            "weekdays" | "workdays" => return Ok(Self::workdays()),
            "weekends" => return Ok(Self::weekends()),
            _ => {}
        }

        let mut days = Self::none();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let lower = part.to_lowercase();
            let day = DAY_NAMES
                .iter()
                .find(|(name, _)| lower.starts_with(name))
                .map(|(_, day)| *day)
                .ok_or_else(|| format!("unknown day: {}", part))?;
            days.set(day, true);
        }

        if days == Self::none() {
            return Err("no days selected".to_string());
        }
        Ok(days)
    }
}

impl fmt::Display for Weekdays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::all() {
            return write!(f, "daily");
        }
        if *self == Self::workdays() {
            return write!(f, "weekdays");
        }
        if *self == Self::weekends() {
            return write!(f, "weekends");
        }
        let names: Vec<&str> = DAY_NAMES
            .iter()
            .filter(|(_, day)| self.is_active_on(*day))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "{}", names.join(","))
    }
}

/// A task with a daily time goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub daily_goal_minutes: u32,
    /// Progress for the active day; only grows until the next rollover
    #[serde(default)]
    pub time_completed_today_ms: u64,
    #[serde(default)]
    pub weekdays: Weekdays,
    #[serde(default)]
    pub archived: bool,
}

impl Task {
    /// Daily goal in milliseconds
    pub fn goal_ms(&self) -> u64 {
        u64::from(self.daily_goal_minutes) * MS_PER_MINUTE
    }

    pub fn is_completed_today(&self) -> bool {
        self.time_completed_today_ms >= self.goal_ms()
    }

    /// Time left until today's goal is reached (zero once completed)
    pub fn remaining_ms(&self) -> u64 {
        self.goal_ms().saturating_sub(self.time_completed_today_ms)
    }

    /// Ratio of completed to goal time (0.0 to 1.0+)
    pub fn progress_ratio(&self) -> f64 {
        let goal = self.goal_ms();
        if goal == 0 {
            return 1.0;
        }
        self.time_completed_today_ms as f64 / goal as f64
    }

    pub fn is_active_on(&self, day: Weekday) -> bool {
        !self.archived && self.weekdays.is_active_on(day)
    }
}

/// Fields supplied when creating a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub daily_goal_minutes: u32,
    pub weekdays: Weekdays,
}

impl NewTask {
    pub fn new(name: impl Into<String>, daily_goal_minutes: u32) -> Self {
        Self {
            name: name.into(),
            daily_goal_minutes,
            weekdays: Weekdays::all(),
        }
    }

    pub fn with_weekdays(mut self, weekdays: Weekdays) -> Self {
        self.weekdays = weekdays;
        self
    }
}

/// Partial edit of a task; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub daily_goal_minutes: Option<u32>,
    pub weekdays: Option<Weekdays>,
}

/// Check a name/goal pair; returns the trimmed name
pub fn validate_task(name: &str, daily_goal_minutes: u32) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("task name must not be empty".to_string());
    }
    if daily_goal_minutes == 0 {
        return Err("daily goal must be at least one minute".to_string());
    }
    Ok(trimmed.to_string())
}

/// Format milliseconds as a countdown clock ("09:59", "1:05:00")
pub fn format_clock(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Format milliseconds as "Xh Ym" (omits 0 values)
pub fn format_duration(ms: u64) -> String {
    let total_minutes = ms / MS_PER_MINUTE;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours > 0 && minutes > 0 {
        format!("{}h {}m", hours, minutes)
    } else if hours > 0 {
        format!("{}h", hours)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(goal: u32, completed: u64) -> Task {
        Task {
            id: 1,
            name: "Read".to_string(),
            daily_goal_minutes: goal,
            time_completed_today_ms: completed,
            weekdays: Weekdays::all(),
            archived: false,
        }
    }

    #[test]
    fn test_goal_and_completion() {
        let mut t = task(10, 599_000);
        assert_eq!(t.goal_ms(), 600_000);
        assert!(!t.is_completed_today());
        assert_eq!(t.remaining_ms(), 1_000);

        t.time_completed_today_ms = 600_000;
        assert!(t.is_completed_today());
        assert_eq!(t.remaining_ms(), 0);

        // Overshoot is allowed and simply reads as completed
        t.time_completed_today_ms = 700_000;
        assert!(t.is_completed_today());
        assert_eq!(t.remaining_ms(), 0);
    }

    #[test]
    fn test_progress_ratio() {
        assert_eq!(task(10, 300_000).progress_ratio(), 0.5);
        assert_eq!(task(10, 900_000).progress_ratio(), 1.5);
        assert_eq!(task(0, 0).progress_ratio(), 1.0);
    }

    #[test]
    fn test_weekdays_parse() {
        assert_eq!("all".parse::<Weekdays>().unwrap(), Weekdays::all());
        assert_eq!("Weekdays".parse::<Weekdays>().unwrap(), Weekdays::workdays());
        assert_eq!("weekends".parse::<Weekdays>().unwrap(), Weekdays::weekends());

        let days: Weekdays = "mon, Wednesday,fri".parse().unwrap();
        assert!(days.is_active_on(Weekday::Mon));
        assert!(!days.is_active_on(Weekday::Tue));
        assert!(days.is_active_on(Weekday::Wed));
        assert!(days.is_active_on(Weekday::Fri));
        assert_eq!(days.to_string(), "mon,wed,fri");

        assert!("funday".parse::<Weekdays>().is_err());
        assert!("".parse::<Weekdays>().is_err());
    }

    #[test]
    fn test_archived_task_is_never_active() {
        let mut t = task(10, 0);
        assert!(t.is_active_on(Weekday::Sat));
        t.archived = true;
        assert!(!t.is_active_on(Weekday::Sat));
    }

    #[test]
    fn test_validate_task() {
        assert_eq!(validate_task("  Read  ", 10).unwrap(), "Read");
        assert!(validate_task("   ", 10).is_err());
        assert!(validate_task("Read", 0).is_err());
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(599_000), "09:59");
        assert_eq!(format_clock(600_000), "10:00");
        assert_eq!(format_clock(3_900_000), "1:05:00");
        assert_eq!(format_clock(999), "00:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45 * MS_PER_MINUTE), "45m");
        assert_eq!(format_duration(120 * MS_PER_MINUTE), "2h");
        assert_eq!(format_duration(125 * MS_PER_MINUTE), "2h 5m");
    }
}
