use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::event::DayEvent;
use crate::notifications::{NotificationRequest, NotificationSink};

/// Composite identity of a pending reminder: the day plus the event id.
pub type ReminderKey = (NaiveDate, String);

fn default_summary_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap()
}

/// Flag-plus-condvar pair a parked timer thread waits on. Cancelling flips
/// the flag and wakes the thread before its deadline.
#[derive(Default)]
struct CancelToken {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.signal.notify_all();
    }

    /// Parks until the deadline or a cancellation, whichever comes first.
    /// Returns true when the wait ended in cancellation.
    fn wait(&self, timeout: StdDuration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.signal.wait_until(&mut cancelled, deadline).timed_out() {
                return *cancelled;
            }
        }
        true
    }
}

struct PendingReminder {
    token: Arc<CancelToken>,
    due_at: NaiveDateTime,
}

struct SchedulerState {
    pending: HashMap<ReminderKey, PendingReminder>,
    summary_armed: bool,
}

/// Arms and re-arms the local notification timers for a day's events.
///
/// One instance per process is the expected shape, but nothing here is
/// global: tests construct as many independent schedulers as they need.
/// Rescheduling under a key always cancels the previous timer first, so an
/// edited event ends up with exactly one pending timer carrying the latest
/// values.
pub struct ReminderScheduler {
    state: Arc<Mutex<SchedulerState>>,
    sink: Arc<dyn NotificationSink>,
    summary_time: NaiveTime,
}

impl ReminderScheduler {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_summary_time(sink, default_summary_time())
    }

    pub fn with_summary_time(sink: Arc<dyn NotificationSink>, summary_time: NaiveTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                pending: HashMap::new(),
                summary_armed: false,
            })),
            sink,
            summary_time,
        }
    }

    /// Arms one single-shot timer per eligible event: scheduled, not yet
    /// completed, with a nonzero notify-before lead. The reminder instant is
    /// the start time minus the lead, in naive local time. Instants already
    /// in the past are skipped without catch-up.
    pub fn schedule_reminders(&self, day: NaiveDate, events: &[DayEvent], now: DateTime<Local>) {
        for event in events {
            let Some(start) = event.from_time else {
                continue;
            };
            let Some(lead) = event.notify_before.filter(|minutes| *minutes > 0) else {
                continue;
            };
            if event.is_completed {
                continue;
            }

            let key = (day, event.id.clone());
            self.cancel_key(&key);

            let due_at = day.and_time(start) - Duration::minutes(i64::from(lead));
            let Some(delay) = delay_until(due_at, now) else {
                debug!(event = %event.title, %due_at, "reminder instant already passed, skipping");
                continue;
            };
            self.arm(key, event, start, due_at, delay);
        }
    }

    fn arm(
        &self,
        key: ReminderKey,
        event: &DayEvent,
        start: NaiveTime,
        due_at: NaiveDateTime,
        delay: StdDuration,
    ) {
        let token = Arc::new(CancelToken::default());
        let request = NotificationRequest {
            title: format!("Upcoming: {}", event.title),
            body: format!("Starts at {}", start.format("%H:%M")),
        };

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let thread_token = Arc::clone(&token);
        let thread_key = key.clone();

        self.state
            .lock()
            .pending
            .insert(key, PendingReminder { token, due_at });

        thread::spawn(move || {
            if thread_token.wait(delay) {
                return;
            }
            sink.notify(request);
            let mut guard = state.lock();
            if let Some(entry) = guard.pending.get(&thread_key) {
                // Only drop our own entry; a reschedule may have replaced it.
                if Arc::ptr_eq(&entry.token, &thread_token) {
                    guard.pending.remove(&thread_key);
                }
            }
        });
    }

    /// Cancels the pending reminder for one event, if any. Covers both the
    /// cancel-before-rearm rule and an event being removed outright. There
    /// is no cancel-everything call; clearing a whole day means cancelling
    /// each key.
    pub fn cancel(&self, day: NaiveDate, event_id: &str) -> bool {
        self.cancel_key(&(day, event_id.to_string()))
    }

    fn cancel_key(&self, key: &ReminderKey) -> bool {
        let removed = self.state.lock().pending.remove(key);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Arms the once-per-day morning summary. Single-flight: while a summary
    /// timer is armed, further calls are no-ops; firing clears the guard so
    /// a later day can arm again. No-ops when the summary instant for `day`
    /// has already passed or the day has no untimed events.
    pub fn schedule_morning_summary(
        &self,
        day: NaiveDate,
        events: &[DayEvent],
        now: DateTime<Local>,
    ) {
        let mut guard = self.state.lock();
        if guard.summary_armed {
            return;
        }

        let due_at = day.and_time(self.summary_time);
        let Some(delay) = delay_until(due_at, now) else {
            debug!(%day, "morning summary instant already passed, skipping");
            return;
        };

        let untimed = events.iter().filter(|event| event.is_untimed()).count();
        if untimed == 0 {
            return;
        }

        guard.summary_armed = true;
        drop(guard);

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        thread::spawn(move || {
            thread::sleep(delay);
            sink.notify(NotificationRequest {
                title: "Good Morning 🌅".to_string(),
                body: format!("You have {untimed} events today."),
            });
            state.lock().summary_armed = false;
        });
    }

    /// Number of armed single-shot reminders.
    pub fn pending_reminders(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Local instant a pending reminder will fire at, if one is armed.
    pub fn reminder_due_at(&self, day: NaiveDate, event_id: &str) -> Option<NaiveDateTime> {
        self.state
            .lock()
            .pending
            .get(&(day, event_id.to_string()))
            .map(|entry| entry.due_at)
    }

    pub fn summary_armed(&self) -> bool {
        self.state.lock().summary_armed
    }
}

/// Positive wall-clock delay between `now` and the naive-local `due_at`, or
/// `None` when the instant is not in the future.
fn delay_until(due_at: NaiveDateTime, now: DateTime<Local>) -> Option<StdDuration> {
    let delta = due_at - now.naive_local();
    if delta <= Duration::zero() {
        return None;
    }
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NewEvent, Priority};

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<NotificationRequest>>,
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, request: NotificationRequest) {
            self.seen.lock().push(request);
        }
    }

    fn scheduler() -> (ReminderScheduler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = ReminderScheduler::new(Arc::clone(&sink) as Arc<dyn NotificationSink>);
        (scheduler, sink)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn local(date: NaiveDate, at: NaiveTime) -> DateTime<Local> {
        date.and_time(at)
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
    }

    fn scheduled_event(title: &str, start: NaiveTime, lead: Option<u32>) -> DayEvent {
        DayEvent::new(NewEvent::scheduled(
            title,
            "Work",
            Priority::Normal,
            start,
            None,
            lead,
        ))
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + StdDuration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(StdDuration::from_millis(20));
        }
        false
    }

    #[test]
    fn past_instants_never_arm_a_timer() {
        let (scheduler, sink) = scheduler();
        let day = date(2024, 1, 10);
        let event = scheduled_event("Standup", time(10, 0), Some(5));
        // It is already noon; the 09:55 reminder instant has passed.
        scheduler.schedule_reminders(day, &[event], local(day, time(12, 0)));
        assert_eq!(scheduler.pending_reminders(), 0);
        assert!(sink.seen.lock().is_empty());
    }

    #[test]
    fn future_instants_arm_one_timer_per_event() {
        let (scheduler, _sink) = scheduler();
        let day = date(2024, 1, 10);
        let first = scheduled_event("Standup", time(10, 0), Some(5));
        let second = scheduled_event("Review", time(15, 0), Some(30));
        let now = local(day, time(8, 0));
        scheduler.schedule_reminders(day, &[first.clone(), second], now);
        assert_eq!(scheduler.pending_reminders(), 2);
        assert_eq!(
            scheduler.reminder_due_at(day, &first.id),
            Some(day.and_time(time(9, 55)))
        );
    }

    #[test]
    fn completed_untimed_and_leadless_events_are_ignored() {
        let (scheduler, _sink) = scheduler();
        let day = date(2024, 1, 10);
        let now = local(day, time(8, 0));

        let mut done = scheduled_event("Done already", time(10, 0), Some(5));
        done.is_completed = true;
        let no_lead = scheduled_event("No lead", time(10, 0), None);
        let zero_lead = scheduled_event("Zero lead", time(10, 0), Some(0));
        let untimed = DayEvent::new(NewEvent::untimed("Party", "Personal", Priority::Normal));

        scheduler.schedule_reminders(day, &[done, no_lead, zero_lead, untimed], now);
        assert_eq!(scheduler.pending_reminders(), 0);
    }

    #[test]
    fn rescheduling_replaces_the_pending_timer() {
        let (scheduler, _sink) = scheduler();
        let day = date(2024, 1, 10);
        let now = local(day, time(8, 0));
        let mut event = scheduled_event("Standup", time(10, 0), Some(5));

        scheduler.schedule_reminders(day, std::slice::from_ref(&event), now);
        assert_eq!(
            scheduler.reminder_due_at(day, &event.id),
            Some(day.and_time(time(9, 55)))
        );

        event.notify_before = Some(30);
        scheduler.schedule_reminders(day, std::slice::from_ref(&event), now);
        assert_eq!(scheduler.pending_reminders(), 1);
        assert_eq!(
            scheduler.reminder_due_at(day, &event.id),
            Some(day.and_time(time(9, 30)))
        );
    }

    #[test]
    fn rescheduling_to_a_past_instant_leaves_nothing_armed() {
        let (scheduler, _sink) = scheduler();
        let day = date(2024, 1, 10);
        let now = local(day, time(9, 50));
        let mut event = scheduled_event("Standup", time(10, 0), Some(5));

        scheduler.schedule_reminders(day, std::slice::from_ref(&event), now);
        assert_eq!(scheduler.pending_reminders(), 1);

        // The larger lead moves the instant into the past; the old timer is
        // cancelled and no new one appears.
        event.notify_before = Some(30);
        scheduler.schedule_reminders(day, std::slice::from_ref(&event), now);
        assert_eq!(scheduler.pending_reminders(), 0);
    }

    #[test]
    fn cancel_discards_a_pending_timer() {
        let (scheduler, sink) = scheduler();
        let day = date(2024, 1, 10);
        let event = scheduled_event("Standup", time(10, 0), Some(5));
        scheduler.schedule_reminders(day, std::slice::from_ref(&event), local(day, time(8, 0)));
        assert!(scheduler.cancel(day, &event.id));
        assert_eq!(scheduler.pending_reminders(), 0);
        assert!(!scheduler.cancel(day, &event.id));
        assert!(sink.seen.lock().is_empty());
    }

    #[test]
    fn firing_notifies_and_clears_the_entry() {
        let (scheduler, sink) = scheduler();
        // Anchor on the real clock: the reminder instant lands ~200ms out.
        let now = Local::now();
        let fire_at = now.naive_local() + Duration::minutes(1) + Duration::milliseconds(200);
        let day = fire_at.date();
        let event = scheduled_event("Standup", fire_at.time(), Some(1));

        scheduler.schedule_reminders(day, std::slice::from_ref(&event), now);
        assert_eq!(scheduler.pending_reminders(), 1);

        assert!(wait_for(|| !sink.seen.lock().is_empty()));
        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Upcoming: Standup");
        assert!(seen[0].body.starts_with("Starts at "));
        drop(seen);

        assert!(wait_for(|| scheduler.pending_reminders() == 0));
    }

    #[test]
    fn summary_skips_past_instants_and_empty_days() {
        let sink = Arc::new(RecordingSink::default());
        let scheduler = ReminderScheduler::with_summary_time(
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            time(8, 0),
        );
        let day = date(2024, 1, 10);
        let untimed = DayEvent::new(NewEvent::untimed("Party", "Personal", Priority::Normal));

        // Past 08:00: skipped.
        scheduler.schedule_morning_summary(day, std::slice::from_ref(&untimed), local(day, time(9, 0)));
        assert!(!scheduler.summary_armed());

        // Future instant, but no untimed events: skipped.
        let timed = scheduled_event("Standup", time(10, 0), Some(5));
        scheduler.schedule_morning_summary(day, &[timed], local(day, time(6, 0)));
        assert!(!scheduler.summary_armed());

        // Future instant with an untimed event: armed, and armed only once.
        scheduler.schedule_morning_summary(day, std::slice::from_ref(&untimed), local(day, time(6, 0)));
        assert!(scheduler.summary_armed());
        scheduler.schedule_morning_summary(day, std::slice::from_ref(&untimed), local(day, time(6, 0)));
        assert!(scheduler.summary_armed());
        assert!(sink.seen.lock().is_empty());
    }

    #[test]
    fn summary_fires_with_the_untimed_count_and_rearms() {
        let sink = Arc::new(RecordingSink::default());
        let now = Local::now();
        let fire_at = now.naive_local() + Duration::milliseconds(200);
        let scheduler = ReminderScheduler::with_summary_time(
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            fire_at.time(),
        );
        let day = fire_at.date();
        let events = vec![
            DayEvent::new(NewEvent::untimed("Party", "Personal", Priority::Normal)),
            DayEvent::new(NewEvent::untimed("Errand", "Personal", Priority::Normal)),
        ];

        scheduler.schedule_morning_summary(day, &events, now);
        assert!(scheduler.summary_armed());

        assert!(wait_for(|| !sink.seen.lock().is_empty()));
        let seen = sink.seen.lock();
        assert_eq!(seen[0].title, "Good Morning 🌅");
        assert_eq!(seen[0].body, "You have 2 events today.");
        drop(seen);

        // The guard clears after firing so a later day can arm again.
        assert!(wait_for(|| !scheduler.summary_armed()));
    }
}
