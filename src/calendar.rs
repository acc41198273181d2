//! Calendar anchoring: mapping week numbers to concrete dates.
//!
//! All date math runs on `NaiveDate` at local-midnight granularity.
//! Comparing a date-only string against a timestamp must never introduce
//! a timezone-shift off-by-one, so timestamps are truncated to their date
//! portion before anything else happens.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::plan::{Plan, Weekday};

/// ---------------------------------------------------------------------------
/// Anchor Math
/// ---------------------------------------------------------------------------

/// Monday of the calendar week containing `start_date`. A Sunday start is
/// treated as 6 days after the preceding Monday, never as a week start.
pub fn week_monday(start_date: NaiveDate) -> NaiveDate {
  let days_from_monday = start_date.weekday().num_days_from_monday() as i64;
  start_date - Duration::days(days_from_monday)
}

/// Monday of week `week_number` (1-based), given the plan anchor
pub fn date_for_week(week_number: u32, anchor: NaiveDate) -> NaiveDate {
  anchor + Duration::days(7 * (week_number.max(1) as i64 - 1))
}

/// Concrete date of `day` in week `week_number`
pub fn date_for_day(week_number: u32, day: Weekday, anchor: NaiveDate) -> NaiveDate {
  date_for_week(week_number, anchor) + Duration::days(day.offset())
}

/// Which week number `today` falls in, clamped to `[1, total_weeks]`.
/// Before the plan starts the UI still shows week 1, never week 0.
pub fn current_week_number(today: NaiveDate, start_date: NaiveDate, total_weeks: u32) -> u32 {
  let anchor = week_monday(start_date);
  if today < anchor {
    return 1;
  }
  let elapsed_weeks = (today - anchor).num_days() / 7;
  (elapsed_weeks as u32 + 1).clamp(1, total_weeks.max(1))
}

/// Parse a plan start date. Accepts `YYYY-MM-DD` and RFC3339 timestamps;
/// a timestamp is truncated to its date portion so the time-of-day and
/// offset can never shift the calendar day.
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
  let date_part = raw.get(..10).unwrap_or(raw);
  NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// ---------------------------------------------------------------------------
/// Plan Calendar
/// ---------------------------------------------------------------------------

/// Date annotations for one plan. A missing or invalid start date yields
/// the degraded mode: week 1, no date ranges, nothing panics. Callers must
/// tolerate `None` dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCalendar {
  anchor: Option<NaiveDate>,
}

impl PlanCalendar {
  pub fn from_start_date(start_date: Option<NaiveDate>) -> Self {
    Self {
      anchor: start_date.map(week_monday),
    }
  }

  pub fn from_plan(plan: &Plan) -> Self {
    Self::from_start_date(plan.start_date)
  }

  pub fn anchor(&self) -> Option<NaiveDate> {
    self.anchor
  }

  pub fn is_degraded(&self) -> bool {
    self.anchor.is_none()
  }

  pub fn date_for_day(&self, week_number: u32, day: Weekday) -> Option<NaiveDate> {
    self.anchor.map(|a| date_for_day(week_number, day, a))
  }

  /// Monday..Sunday range of a week, or None in degraded mode
  pub fn week_range(&self, week_number: u32) -> Option<(NaiveDate, NaiveDate)> {
    self.anchor.map(|a| {
      let monday = date_for_week(week_number, a);
      (monday, monday + Duration::days(6))
    })
  }

  pub fn current_week(&self, today: NaiveDate, total_weeks: u32) -> u32 {
    match self.anchor {
      Some(anchor) => current_week_number(today, anchor, total_weeks),
      None => 1,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
