use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::calendar::Month;
use crate::event::DayEvent;

/// Checked-day totals over an inclusive day range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EfficiencySummary {
    pub checked_count: u32,
    pub total_days: u32,
    pub percent: u32,
}

/// Completion share of one day's scheduled items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCompletion {
    pub completed: u32,
    pub total: u32,
    pub percent: u32,
}

/// An inclusive `[from, to]` day range within one month.
///
/// Construction validates user input; the calculator clamps again on its own,
/// so a span applied before a month switch is still safe to keep using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpanError {
    #[error("use whole numbers")]
    NotAWholeNumber,
    #[error("values must be 1..{max}")]
    OutOfBounds { max: u32 },
    #[error("`from` must be <= `to`")]
    Inverted,
}

impl DaySpan {
    pub fn new(from: u32, to: u32, month: Month) -> Result<Self, SpanError> {
        let max = month.days();
        if from < 1 || to < 1 || from > max || to > max {
            return Err(SpanError::OutOfBounds { max });
        }
        if from > to {
            return Err(SpanError::Inverted);
        }
        Ok(Self { from, to })
    }

    /// Parses raw form input. Mirrors the original range form's submission
    /// rules: whole numbers, within the month, not inverted. On rejection
    /// the caller keeps the previously applied span.
    pub fn parse(from: &str, to: &str, month: Month) -> Result<Self, SpanError> {
        let from: i64 = from.trim().parse().map_err(|_| SpanError::NotAWholeNumber)?;
        let to: i64 = to.trim().parse().map_err(|_| SpanError::NotAWholeNumber)?;
        let max = i64::from(month.days());
        if from < 1 || to < 1 || from > max || to > max {
            return Err(SpanError::OutOfBounds { max: month.days() });
        }
        Self::new(from as u32, to as u32, month)
    }

    pub fn full_month(month: Month) -> Self {
        Self {
            from: 1,
            to: month.days().max(1),
        }
    }
}

/// Checked-day totals for `span` within `month`.
///
/// Endpoints are clamped into the month and normalized; when `month` is the
/// month `today` falls in, the effective end is capped at `today` so
/// unresolved future days are never counted. Pure: identical inputs always
/// yield identical output.
pub fn efficiency(
    checks: &BTreeMap<NaiveDate, bool>,
    month: Month,
    span: DaySpan,
    today: NaiveDate,
) -> EfficiencySummary {
    let max_day = month.days();
    if max_day == 0 {
        return EfficiencySummary::default();
    }

    let from = span.from.clamp(1, max_day);
    let to = span.to.clamp(1, max_day);
    let start = from.min(to);
    let mut end = from.max(to);
    if month.contains(today) {
        end = end.min(today.day());
    }

    if start > end {
        return EfficiencySummary::default();
    }

    let total_days = end - start + 1;
    let checked_count = (start..=end)
        .filter_map(|day| month.date(day))
        .filter(|date| checks.get(date).copied().unwrap_or(false))
        .count() as u32;
    let percent = (f64::from(checked_count) / f64::from(total_days) * 100.0).round() as u32;

    EfficiencySummary {
        checked_count,
        total_days,
        percent,
    }
}

/// Share of a day's scheduled items that are completed; untimed events do
/// not participate.
pub fn day_completion(events: &[DayEvent]) -> DayCompletion {
    let total = events.iter().filter(|event| event.is_scheduled()).count() as u32;
    if total == 0 {
        return DayCompletion::default();
    }
    let completed = events
        .iter()
        .filter(|event| event.is_scheduled() && event.is_completed)
        .count() as u32;
    let percent = (f64::from(completed) / f64::from(total) * 100.0).round() as u32;
    DayCompletion {
        completed,
        total,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NewEvent, Priority};
    use chrono::NaiveTime;

    fn month(year: i32, m: u32) -> Month {
        Month::new(year, m).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn checks(dates: &[(i32, u32, u32)]) -> BTreeMap<NaiveDate, bool> {
        dates.iter().map(|&(y, m, d)| (date(y, m, d), true)).collect()
    }

    #[test]
    fn counts_checked_days_in_range() {
        let checks = checks(&[(2024, 1, 2), (2024, 1, 3), (2024, 1, 10)]);
        let summary = efficiency(
            &checks,
            month(2024, 1),
            DaySpan { from: 1, to: 5 },
            date(2024, 3, 1),
        );
        assert_eq!(summary.checked_count, 2);
        assert_eq!(summary.total_days, 5);
        assert_eq!(summary.percent, 40);
    }

    #[test]
    fn percent_rounds_to_nearest() {
        let checks = checks(&[(2024, 1, 1)]);
        let summary = efficiency(
            &checks,
            month(2024, 1),
            DaySpan { from: 1, to: 3 },
            date(2024, 3, 1),
        );
        assert_eq!(summary.percent, 33);
    }

    #[test]
    fn totals_stay_within_bounds_for_any_span() {
        let checks = checks(&[(2024, 1, 5), (2024, 1, 20), (2024, 1, 31)]);
        let today = date(2024, 3, 1);
        for from in [1u32, 7, 15, 31] {
            for to in [1u32, 7, 15, 31] {
                let summary =
                    efficiency(&checks, month(2024, 1), DaySpan { from, to }, today);
                assert!(summary.checked_count <= summary.total_days);
                assert!(summary.percent <= 100);
            }
        }
    }

    #[test]
    fn inverted_and_oversized_spans_are_normalized() {
        let checks = checks(&[(2024, 1, 2)]);
        let summary = efficiency(
            &checks,
            month(2024, 1),
            DaySpan { from: 40, to: 1 },
            date(2024, 3, 1),
        );
        // Clamped to [1, 31] and reordered.
        assert_eq!(summary.total_days, 31);
        assert_eq!(summary.checked_count, 1);
    }

    #[test]
    fn current_month_caps_at_today() {
        let checks = checks(&[(2024, 1, 9), (2024, 1, 10), (2024, 1, 25)]);
        let summary = efficiency(
            &checks,
            month(2024, 1),
            DaySpan { from: 1, to: 31 },
            date(2024, 1, 10),
        );
        assert_eq!(summary.total_days, 10);
        assert_eq!(summary.checked_count, 2);
        assert_eq!(summary.percent, 20);
    }

    #[test]
    fn all_future_range_yields_zero_totals() {
        let checks = checks(&[(2024, 1, 2)]);
        let summary = efficiency(
            &checks,
            month(2024, 1),
            DaySpan { from: 20, to: 31 },
            date(2024, 1, 10),
        );
        assert_eq!(summary, EfficiencySummary::default());
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let checks = checks(&[(2024, 1, 2), (2024, 1, 7)]);
        let span = DaySpan { from: 1, to: 15 };
        let today = date(2024, 1, 20);
        let first = efficiency(&checks, month(2024, 1), span, today);
        let second = efficiency(&checks, month(2024, 1), span, today);
        assert_eq!(first, second);
    }

    #[test]
    fn span_parse_enforces_the_form_rules() {
        let m = month(2024, 1);
        assert_eq!(DaySpan::parse("3", "10", m), Ok(DaySpan { from: 3, to: 10 }));
        assert_eq!(DaySpan::parse(" 3 ", "10", m), Ok(DaySpan { from: 3, to: 10 }));
        assert_eq!(DaySpan::parse("3.5", "10", m), Err(SpanError::NotAWholeNumber));
        assert_eq!(DaySpan::parse("abc", "10", m), Err(SpanError::NotAWholeNumber));
        assert_eq!(
            DaySpan::parse("0", "10", m),
            Err(SpanError::OutOfBounds { max: 31 })
        );
        assert_eq!(
            DaySpan::parse("-1", "10", m),
            Err(SpanError::OutOfBounds { max: 31 })
        );
        assert_eq!(
            DaySpan::parse("1", "32", m),
            Err(SpanError::OutOfBounds { max: 31 })
        );
        assert_eq!(DaySpan::parse("10", "3", m), Err(SpanError::Inverted));
    }

    #[test]
    fn day_completion_ignores_untimed_events() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let mut meeting = DayEvent::new(NewEvent::scheduled(
            "Meeting",
            "Work",
            Priority::Normal,
            nine,
            None,
            None,
        ));
        meeting.is_completed = true;
        let gym = DayEvent::new(NewEvent::scheduled(
            "Gym",
            "Health",
            Priority::Normal,
            nine,
            None,
            None,
        ));
        let party = DayEvent::new(NewEvent::untimed("Party", "Personal", Priority::Normal));

        let completion = day_completion(&[meeting, gym, party]);
        assert_eq!(completion.completed, 1);
        assert_eq!(completion.total, 2);
        assert_eq!(completion.percent, 50);
    }

    #[test]
    fn day_completion_is_zero_without_scheduled_items() {
        let party = DayEvent::new(NewEvent::untimed("Party", "Personal", Priority::Normal));
        assert_eq!(day_completion(&[party]), DayCompletion::default());
        assert_eq!(day_completion(&[]), DayCompletion::default());
    }
}
