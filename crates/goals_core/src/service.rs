use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::activity::{self, Activity};
use crate::calendar::Month;
use crate::efficiency::{self, DayCompletion, DaySpan, EfficiencySummary};
use crate::event::{DayEvent, NewEvent};
use crate::notifications::{NotificationSink, NullSink};
use crate::reminders::ReminderScheduler;
use crate::storage::{activities_key, events_key, JsonStore};
use crate::streak::{self, StreakSummary};

const UNDO_WINDOW_SECS: i64 = 7;

/// One month's full content, the export/import interchange payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthExport {
    pub year: i32,
    pub month: u32,
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub events: BTreeMap<NaiveDate, Vec<DayEvent>>,
}

impl MonthExport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid file format: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("month {0} is out of range (expected 1..=12)")]
    MonthOutOfRange(u32),
}

struct RemovedActivity {
    activity: Activity,
    index: usize,
    removed_at: DateTime<Local>,
}

pub struct TrackerServiceBuilder {
    store_dir: Option<PathBuf>,
    month: Option<Month>,
    sink: Option<Arc<dyn NotificationSink>>,
    summary_time: Option<NaiveTime>,
    undo_window: Duration,
}

impl TrackerServiceBuilder {
    pub fn new() -> Self {
        Self {
            store_dir: None,
            month: None,
            sink: None,
            summary_time: None,
            undo_window: Duration::seconds(UNDO_WINDOW_SECS),
        }
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// The month to open with. Defaults to the current wall-clock month.
    pub fn month(mut self, month: Month) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn summary_time(mut self, time: NaiveTime) -> Self {
        self.summary_time = Some(time);
        self
    }

    pub fn undo_window(mut self, window: Duration) -> Self {
        self.undo_window = window;
        self
    }

    pub fn build(self) -> Result<TrackerService> {
        let dir = self
            .store_dir
            .ok_or_else(|| anyhow!("a store directory is required"))?;
        let store = JsonStore::open(dir)?;
        let month = self
            .month
            .unwrap_or_else(|| Month::of(Local::now().date_naive()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        let scheduler = match self.summary_time {
            Some(time) => ReminderScheduler::with_summary_time(sink, time),
            None => ReminderScheduler::new(sink),
        };

        let mut service = TrackerService {
            store,
            month,
            activities: Vec::new(),
            events: BTreeMap::new(),
            last_removed: None,
            undo_window: self.undo_window,
            scheduler,
        };
        service.load_month();
        info!(
            year = month.year(),
            month = month.month(),
            "tracker service ready"
        );
        Ok(service)
    }
}

impl Default for TrackerServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the viewed month's live state and persists every mutation, the way
/// the original kept its collections in component state and mirrored them to
/// storage on each change. All statistics delegate to the pure calculators;
/// all reminder bookkeeping delegates to the scheduler.
pub struct TrackerService {
    store: JsonStore,
    month: Month,
    activities: Vec<Activity>,
    events: BTreeMap<NaiveDate, Vec<DayEvent>>,
    last_removed: Option<RemovedActivity>,
    undo_window: Duration,
    scheduler: ReminderScheduler,
}

impl TrackerService {
    pub fn builder() -> TrackerServiceBuilder {
        TrackerServiceBuilder::new()
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.id == id)
    }

    pub fn activity_by_name(&self, name: &str) -> Option<&Activity> {
        self.activities
            .iter()
            .find(|activity| activity.name.eq_ignore_ascii_case(name))
    }

    pub fn events_for_day(&self, day: NaiveDate) -> &[DayEvent] {
        self.events.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Switches the viewed month. Mutations persist as they happen, so the
    /// outgoing month only needs a final flush before the new one loads.
    #[instrument(skip(self))]
    pub fn set_month(&mut self, month: Month) {
        if month == self.month {
            return;
        }
        self.persist();
        self.month = month;
        self.load_month();
    }

    pub fn add_activity(&mut self, name: &str) -> Option<&Activity> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        self.activities.push(Activity::new(name));
        self.persist();
        self.activities.last()
    }

    /// Soft delete: the activity moves to a single-slot undo buffer and can
    /// be reinserted at its original position within the undo window.
    #[instrument(skip(self, now))]
    pub fn remove_activity(&mut self, id: &str, now: DateTime<Local>) -> bool {
        let Some(index) = self.activities.iter().position(|activity| activity.id == id) else {
            return false;
        };
        let activity = self.activities.remove(index);
        info!(name = %activity.name, "activity removed");
        self.last_removed = Some(RemovedActivity {
            activity,
            index,
            removed_at: now,
        });
        self.persist();
        true
    }

    pub fn undo_remove(&mut self, now: DateTime<Local>) -> bool {
        let Some(removed) = self.last_removed.take() else {
            return false;
        };
        if now - removed.removed_at > self.undo_window {
            debug!("undo window elapsed, removal is final");
            return false;
        }
        let index = removed.index.min(self.activities.len());
        self.activities.insert(index, removed.activity);
        self.persist();
        true
    }

    /// Flips one day's completion mark. Days after `today` cannot be
    /// toggled: unresolved future days never carry checks.
    pub fn toggle_check(&mut self, id: &str, day: u32, today: NaiveDate) -> bool {
        let Some(date) = self.month.date(day) else {
            return false;
        };
        if date > today {
            debug!(%date, "refusing to toggle a future day");
            return false;
        }
        let Some(activity) = self.activities.iter_mut().find(|activity| activity.id == id) else {
            return false;
        };
        activity.toggle(date);
        self.persist();
        true
    }

    /// Adds one event. Scheduled items cannot be created on days already in
    /// the past; untimed events can. Re-arms the day's reminders.
    pub fn add_event(
        &mut self,
        day: NaiveDate,
        draft: NewEvent,
        now: DateTime<Local>,
    ) -> Option<&DayEvent> {
        if draft.from_time.is_some() && day < now.date_naive() {
            debug!(%day, "refusing to schedule an item on a past day");
            return None;
        }
        self.events.entry(day).or_default().push(DayEvent::new(draft));
        self.after_event_change(day, now);
        self.events.get(&day).and_then(|list| list.last())
    }

    /// Applies an in-place edit to one event, then re-arms the day's
    /// reminders so an edited time or lead replaces the pending timer.
    pub fn update_event(
        &mut self,
        day: NaiveDate,
        event_id: &str,
        edit: impl FnOnce(&mut DayEvent),
        now: DateTime<Local>,
    ) -> bool {
        let Some(list) = self.events.get_mut(&day) else {
            return false;
        };
        let Some(event) = list.iter_mut().find(|event| event.id == event_id) else {
            return false;
        };
        edit(event);
        self.after_event_change(day, now);
        true
    }

    pub fn set_completed(
        &mut self,
        day: NaiveDate,
        event_id: &str,
        completed: bool,
        now: DateTime<Local>,
    ) -> bool {
        self.update_event(day, event_id, |event| event.is_completed = completed, now)
    }

    /// Removes one event and cancels any reminder still pending for it.
    pub fn remove_event(&mut self, day: NaiveDate, event_id: &str, now: DateTime<Local>) -> bool {
        let Some(list) = self.events.get_mut(&day) else {
            return false;
        };
        let before = list.len();
        list.retain(|event| event.id != event_id);
        if list.len() == before {
            return false;
        }
        self.scheduler.cancel(day, event_id);
        self.after_event_change(day, now);
        true
    }

    /// Arms reminders and the morning summary for one day, typically today
    /// on startup; mutations keep them fresh afterwards.
    pub fn arm_day(&self, day: NaiveDate, now: DateTime<Local>) {
        let events = self.events_for_day(day);
        self.scheduler.schedule_reminders(day, events, now);
        self.scheduler.schedule_morning_summary(day, events, now);
    }

    pub fn efficiency_for(
        &self,
        id: &str,
        span: DaySpan,
        today: NaiveDate,
    ) -> Option<EfficiencySummary> {
        self.activity(id)
            .map(|activity| efficiency::efficiency(&activity.checks, self.month, span, today))
    }

    pub fn streaks_for(&self, id: &str, today: NaiveDate) -> Option<StreakSummary> {
        self.activity(id)
            .map(|activity| streak::global_streaks(activity, self.month, &self.store, today))
    }

    pub fn day_completion(&self, day: NaiveDate) -> DayCompletion {
        efficiency::day_completion(self.events_for_day(day))
    }

    pub fn export_month(&self) -> MonthExport {
        MonthExport {
            year: self.month.year(),
            month: self.month.month(),
            activities: self.activities.clone(),
            events: self.events.clone(),
        }
    }

    /// Replaces the viewed month with an imported payload. A rejected
    /// payload leaves the in-memory state untouched.
    #[instrument(skip(self, payload))]
    pub fn import_month(&mut self, payload: MonthExport) -> Result<(), ImportError> {
        let Some(month) = Month::new(payload.year, payload.month) else {
            return Err(ImportError::MonthOutOfRange(payload.month));
        };
        self.month = month;
        self.activities = payload.activities;
        self.events = payload.events;
        self.scrub_out_of_month_checks();
        self.last_removed = None;
        self.persist();
        Ok(())
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), ImportError> {
        let payload: MonthExport = serde_json::from_str(json)?;
        self.import_month(payload)
    }

    fn load_month(&mut self) {
        self.activities = self.load_initial_activities();
        self.events = self.store.load(&events_key(self.month)).unwrap_or_default();
        self.last_removed = None;
    }

    /// The original's "smart loader": the month's own record, else the
    /// previous month's roster with cleared checks (so ids stay stable
    /// across the boundary), else the starter roster.
    fn load_initial_activities(&self) -> Vec<Activity> {
        if let Some(stored) = self.store.load::<Vec<Activity>>(&activities_key(self.month)) {
            return stored;
        }
        if let Some(previous) = self
            .store
            .load::<Vec<Activity>>(&activities_key(self.month.prev()))
        {
            debug!("inheriting roster from previous month");
            return previous.iter().map(Activity::carried_forward).collect();
        }
        activity::default_roster()
    }

    fn after_event_change(&mut self, day: NaiveDate, now: DateTime<Local>) {
        if self.events.get(&day).is_some_and(Vec::is_empty) {
            self.events.remove(&day);
        }
        self.persist();
        self.scheduler
            .schedule_reminders(day, self.events_for_day(day), now);
    }

    fn persist(&self) {
        self.store.save(&activities_key(self.month), &self.activities);
        self.store.save(&events_key(self.month), &self.events);
    }

    /// Stored month records must not carry checks for foreign days; imports
    /// are the only path that could smuggle them in.
    fn scrub_out_of_month_checks(&mut self) {
        let month = self.month;
        for activity in &mut self.activities {
            let before = activity.checks.len();
            activity.checks.retain(|date, _| month.contains(*date));
            if activity.checks.len() != before {
                warn!(
                    name = %activity.name,
                    "dropped imported checks outside {}-{:02}",
                    month.year(),
                    month.month()
                );
            }
        }
    }
}
