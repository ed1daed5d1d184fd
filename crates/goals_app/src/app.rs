use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local, NaiveDate, NaiveTime};
use directories::ProjectDirs;
use tracing::info;

use goals_core::calendar::{date_string, weekday_short, Month};
use goals_core::efficiency::{DaySpan, EfficiencySummary};
use goals_core::event::DayEvent;
use goals_core::streak::{current_streak_in_span, max_streak_in_month, StreakSummary};
use goals_core::TrackerService;

use crate::notifier::DesktopNotifier;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) store_dir: PathBuf,
    pub(crate) summary_time: Option<NaiveTime>,
    pub(crate) undo_secs: Option<i64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = env::var("GOALS_DIR") {
            if !dir.trim().is_empty() {
                config.store_dir = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = env::var("GOALS_SUMMARY_TIME") {
            config.summary_time = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok();
        }
        if let Ok(raw) = env::var("GOALS_UNDO_SECS") {
            config.undo_secs = raw.trim().parse().ok();
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            summary_time: None,
            undo_secs: None,
        }
    }
}

fn default_store_dir() -> PathBuf {
    ProjectDirs::from("com", "daily-goals", "DailyGoals")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("daily-goals-data"))
}

pub fn run(config: AppConfig) -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut service = build_service(&config)?;
    let now = Local::now();
    let today = now.date_naive();

    match args.first().map(String::as_str) {
        None => print_dashboard(&service, today),
        Some("add") => {
            let name = args[1..].join(" ");
            if name.trim().is_empty() {
                bail!("usage: goals_tracker add <name>");
            }
            match service.add_activity(&name) {
                Some(activity) => println!("Added \"{}\"", activity.name),
                None => bail!("activity name must not be empty"),
            }
        }
        Some("toggle") => {
            let (name, day) = match (args.get(1), args.get(2)) {
                (Some(name), Some(day)) => (name.clone(), day.parse::<u32>()?),
                (Some(name), None) => (name.clone(), today.day()),
                _ => bail!("usage: goals_tracker toggle <name> [day]"),
            };
            let id = service
                .activity_by_name(&name)
                .map(|activity| activity.id.clone())
                .with_context(|| format!("no activity named \"{name}\""))?;
            if service.toggle_check(&id, day, today) {
                println!("Toggled {name} on day {day}");
            } else {
                bail!("day {day} cannot be toggled (future or invalid)");
            }
        }
        Some("export") => {
            let path = args.get(1).context("usage: goals_tracker export <path>")?;
            let json = service.export_month().to_json()?;
            fs::write(path, json).with_context(|| format!("unable to write `{path}`"))?;
            println!("Exported {} to {path}", month_label(service.month()));
        }
        Some("import") => {
            let path = args.get(1).context("usage: goals_tracker import <path>")?;
            let json =
                fs::read_to_string(path).with_context(|| format!("unable to read `{path}`"))?;
            service.import_json(&json)?;
            println!("Imported {}", month_label(service.month()));
            print_dashboard(&service, today);
        }
        Some("watch") => {
            print_dashboard(&service, today);
            service.arm_day(today, now);
            info!("reminders armed, staying resident");
            loop {
                thread::sleep(Duration::from_secs(60));
            }
        }
        Some(other) => {
            bail!(
                "unknown command `{other}` (expected: add, toggle, export, import, watch)"
            );
        }
    }

    Ok(())
}

fn build_service(config: &AppConfig) -> Result<TrackerService> {
    let mut builder = TrackerService::builder()
        .store_dir(config.store_dir.clone())
        .with_notification_sink(Arc::new(DesktopNotifier));
    if let Some(time) = config.summary_time {
        builder = builder.summary_time(time);
    }
    if let Some(secs) = config.undo_secs {
        builder = builder.undo_window(chrono::Duration::seconds(secs));
    }
    builder.build()
}

fn print_dashboard(service: &TrackerService, today: NaiveDate) {
    let month = service.month();
    let span = DaySpan::full_month(month);

    println!(
        "Daily goals — {} ({} {})",
        month_label(month),
        weekday_short(today),
        date_string(today)
    );
    for activity in service.activities() {
        let eff = service
            .efficiency_for(&activity.id, span, today)
            .unwrap_or_default();
        let streaks = service.streaks_for(&activity.id, today).unwrap_or_default();
        let month_run = current_streak_in_span(&activity.checks, month, span, today);
        let month_best = max_streak_in_month(&activity.checks, month);
        println!(
            "  {}",
            format_activity_line(&activity.name, eff, streaks, month_run, month_best)
        );
    }

    let events = service.events_for_day(today);
    if !events.is_empty() {
        println!("Today:");
        for event in events {
            println!("  {}", format_event_line(event));
        }
        let completion = service.day_completion(today);
        if completion.total > 0 {
            println!(
                "  {} of {} scheduled items done ({}%)",
                completion.completed, completion.total, completion.percent
            );
        }
    }
}

fn month_label(month: Month) -> String {
    format!("{}-{:02}", month.year(), month.month())
}

fn format_activity_line(
    name: &str,
    eff: EfficiencySummary,
    streaks: StreakSummary,
    month_run: u32,
    month_best: u32,
) -> String {
    format!(
        "{name:<20} {checked:>2}/{total:<2} {percent:>3}%  \u{1f525} {current}  \u{1f3c6} {max}  (month {month_run}/{month_best})",
        checked = eff.checked_count,
        total = eff.total_days,
        percent = eff.percent,
        current = streaks.current,
        max = streaks.max,
    )
}

fn format_event_line(event: &DayEvent) -> String {
    match (event.from_time, event.to_time) {
        (Some(from), Some(to)) => format!(
            "{}-{} {} [{}]{}",
            from.format("%H:%M"),
            to.format("%H:%M"),
            event.title,
            event.category,
            if event.is_completed { " (done)" } else { "" },
        ),
        (Some(from), None) => format!(
            "{}       {} [{}]{}",
            from.format("%H:%M"),
            event.title,
            event.category,
            if event.is_completed { " (done)" } else { "" },
        ),
        _ => format!("•           {} [{}]", event.title, event.category),
    }
}
