use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};

use crate::activity::Activity;
use crate::calendar::Month;
use crate::efficiency::DaySpan;
use crate::storage::ActivityArchive;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakSummary {
    /// Run still alive as of `today` (last check today or yesterday), else 0.
    pub current: u32,
    /// Longest run anywhere in the history.
    pub max: u32,
}

/// All-time streaks for one activity, stitched across every stored month.
///
/// The in-memory `activity` is the authoritative record for the `viewed`
/// month; the archive supplies every other month, joined by the activity's
/// id, never by position: rosters may differ in order and length between
/// months. The whole history is rescanned on every call, O(total checked
/// days); callers should invoke once per activity per refresh, not per
/// keystroke.
pub fn global_streaks(
    activity: &Activity,
    viewed: Month,
    archive: &dyn ActivityArchive,
    today: NaiveDate,
) -> StreakSummary {
    let mut all_checks: BTreeSet<NaiveDate> = activity.checked_dates().collect();
    for month in archive.stored_months() {
        if month == viewed {
            continue;
        }
        let stored = archive.load_activities(month);
        if let Some(past) = stored.iter().find(|candidate| candidate.id == activity.id) {
            all_checks.extend(past.checked_dates());
        }
    }

    let mut max = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for date in &all_checks {
        run = match prev {
            Some(prev) if consecutive(prev, *date) => run + 1,
            _ => {
                max = max.max(run);
                1
            }
        };
        prev = Some(*date);
    }
    max = max.max(run);

    let current = match prev {
        Some(last) if alive(last, today) => run,
        _ => 0,
    };

    StreakSummary { current, max }
}

/// Exact calendar-day adjacency, by date components.
fn consecutive(prev: NaiveDate, next: NaiveDate) -> bool {
    prev.succ_opt() == Some(next)
}

fn alive(last: NaiveDate, today: NaiveDate) -> bool {
    last == today || Some(last) == today.pred_opt()
}

/// Consecutive run ending at the last visible day of `span`, walking
/// backwards. This is the month-local counter displayed beside the global
/// one; it never looks outside `month`.
pub fn current_streak_in_span(
    checks: &BTreeMap<NaiveDate, bool>,
    month: Month,
    span: DaySpan,
    today: NaiveDate,
) -> u32 {
    let max_day = month.days();
    if max_day == 0 {
        return 0;
    }
    let mut last = span.to.min(max_day);
    if month.contains(today) {
        last = last.min(today.day());
    }
    let start = span.from.clamp(1, max_day);

    let mut run = 0;
    let mut day = last;
    while day >= start {
        let checked = month
            .date(day)
            .map(|date| checks.get(&date).copied().unwrap_or(false))
            .unwrap_or(false);
        if !checked {
            break;
        }
        run += 1;
        if day == start {
            break;
        }
        day -= 1;
    }
    run
}

/// Longest run anywhere in the month, span-independent.
pub fn max_streak_in_month(checks: &BTreeMap<NaiveDate, bool>, month: Month) -> u32 {
    let mut max = 0;
    let mut run = 0;
    for day in 1..=month.days() {
        let checked = month
            .date(day)
            .map(|date| checks.get(&date).copied().unwrap_or(false))
            .unwrap_or(false);
        if checked {
            run += 1;
        } else {
            max = max.max(run);
            run = 0;
        }
    }
    max.max(run)
}
