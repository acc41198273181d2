//! Plan document model: the authoritative schedule skeleton.
//!
//! A `Plan` is generated once, persisted as a document, and only ever
//! rewritten wholesale by the reconciler. User deltas live in the overlay
//! layers (`models::overlay`), never in the plan itself.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// ---------------------------------------------------------------------------
/// Training Phase
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Phase {
  Preparation,
  #[default]
  Base,
  Build,
  Peak,
  Taper,
  Recovery,
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Preparation => write!(f, "preparation"),
      Self::Base => write!(f, "base"),
      Self::Build => write!(f, "build"),
      Self::Peak => write!(f, "peak"),
      Self::Taper => write!(f, "taper"),
      Self::Recovery => write!(f, "recovery"),
    }
  }
}

impl std::str::FromStr for Phase {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "preparation" => Ok(Self::Preparation),
      "base" => Ok(Self::Base),
      "build" => Ok(Self::Build),
      "peak" => Ok(Self::Peak),
      "taper" => Ok(Self::Taper),
      "recovery" => Ok(Self::Recovery),
      _ => Err(format!("Unknown phase: {}", s)),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Weekday
/// ---------------------------------------------------------------------------

/// Day names as they appear in plan documents and overlay keys.
/// Monday is day 0; Sunday is always 6 days after the week's Monday,
/// never a week start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
  Monday,
  Tuesday,
  Wednesday,
  Thursday,
  Friday,
  Saturday,
  Sunday,
}

impl Weekday {
  pub const ALL: [Weekday; 7] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
    Weekday::Saturday,
    Weekday::Sunday,
  ];

  /// Offset from the week's Monday in days (Monday = 0 .. Sunday = 6)
  pub fn offset(&self) -> i64 {
    match self {
      Self::Monday => 0,
      Self::Tuesday => 1,
      Self::Wednesday => 2,
      Self::Thursday => 3,
      Self::Friday => 4,
      Self::Saturday => 5,
      Self::Sunday => 6,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Monday => "Monday",
      Self::Tuesday => "Tuesday",
      Self::Wednesday => "Wednesday",
      Self::Thursday => "Thursday",
      Self::Friday => "Friday",
      Self::Saturday => "Saturday",
      Self::Sunday => "Sunday",
    }
  }
}

impl std::fmt::Display for Weekday {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for Weekday {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "monday" => Ok(Self::Monday),
      "tuesday" => Ok(Self::Tuesday),
      "wednesday" => Ok(Self::Wednesday),
      "thursday" => Ok(Self::Thursday),
      "friday" => Ok(Self::Friday),
      "saturday" => Ok(Self::Saturday),
      "sunday" => Ok(Self::Sunday),
      _ => Err(format!("Unknown weekday: {}", s)),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Workout Type
/// ---------------------------------------------------------------------------

/// Closed workout category. Plan documents carry a free-text type tag;
/// `normalize` maps it into this enum exactly once, at resolution time,
/// so downstream logic never re-derives type from display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutType {
  Tempo,
  Intervals,
  Hills,
  LongRun,
  Easy,
  Rest,
  RestOrCrossTrain,
  Bike,
  BrickLongRun,
  Other,
}

impl WorkoutType {
  /// Normalize a raw type tag, falling back to name-substring detection
  /// for legacy content that only encodes modality in the display name.
  pub fn normalize(raw_tag: &str, name: &str) -> Self {
    match raw_tag {
      "tempo" => Self::Tempo,
      "intervals" | "interval" => Self::Intervals,
      "hills" => Self::Hills,
      "longRun" | "long_run" => Self::LongRun,
      "easy" => Self::Easy,
      "rest" => Self::Rest,
      "rest_or_xt" | "restOrXt" => Self::RestOrCrossTrain,
      "bike" => Self::Bike,
      "brickLongRun" | "brick_long_run" => Self::BrickLongRun,
      _ => {
        let lower = name.to_lowercase();
        if lower.contains("brick") {
          Self::BrickLongRun
        } else if lower.contains("bike") || lower.contains("cycling") {
          Self::Bike
        } else {
          Self::Other
        }
      }
    }
  }

  /// Default mileage when no distance can be extracted from a workout.
  /// A "better than nothing" policy for malformed content, not an estimate.
  pub fn default_miles(&self) -> f64 {
    match self {
      Self::Rest | Self::RestOrCrossTrain => 0.0,
      Self::LongRun => 10.0,
      Self::Tempo => 6.0,
      Self::Intervals => 5.0,
      Self::Easy => 4.0,
      Self::Hills => 5.0,
      _ => 4.0,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Plan Aggregate
/// ---------------------------------------------------------------------------

/// Display payload for a single workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
  pub name: String,
  pub description: String,
}

/// The base (originally generated) workout for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySlot {
  pub day: Weekday,

  /// Raw workout category tag as generated; normalized via
  /// `WorkoutType::normalize` at resolution time
  #[serde(rename = "type")]
  pub workout_type: String,

  pub workout: Workout,

  /// Authoritative distance in miles, when the generator supplied one
  #[serde(skip_serializing_if = "Option::is_none")]
  pub distance: Option<f64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub focus: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
  /// 1-based week number
  pub week_number: u32,

  pub phase: Phase,

  /// One entry per scheduled calendar day; may be fewer than 7
  pub workouts: Vec<DaySlot>,

  /// Authoritative weekly total supplied by the generator. When present
  /// it wins over the derived aggregate for display.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub total_mileage: Option<f64>,
}

impl Week {
  /// A week with no workouts is malformed and triggers defensive repair
  /// during reconciliation.
  pub fn is_malformed(&self) -> bool {
    self.workouts.is_empty()
  }

  pub fn day_slot(&self, day: Weekday) -> Option<&DaySlot> {
    self.workouts.iter().find(|s| s.day == day)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  /// User-selected start date; may fall mid-week. Missing or unparseable
  /// dates put the calendar into degraded mode rather than failing.
  pub start_date: Option<NaiveDate>,

  pub total_weeks: u32,

  /// Index i holds week number i+1. Once materialized,
  /// `weeks.len() == total_weeks` and the reconciler preserves that.
  pub weeks: Vec<Week>,
}

impl Plan {
  pub fn week(&self, week_number: u32) -> Option<&Week> {
    if week_number == 0 {
      return None;
    }
    self.weeks.get(week_number as usize - 1)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
