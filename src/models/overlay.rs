//! Overlay layers: sparse, independently-persisted user deltas.
//!
//! Both overlays are keyed by the composite `SlotKey` and layered on top
//! of the base plan at read time. Resolution order is always
//! base -> modified -> completion-annotated; neither layer silently
//! overrides the other.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::plan::{DaySlot, Weekday, WorkoutType};

/// ---------------------------------------------------------------------------
/// Slot Key
/// ---------------------------------------------------------------------------

/// Composite identity of one addressable workout position.
///
/// Slot 0 is the primary slot for a day; slots >= 1 are added sessions
/// ("two-a-day"). Serialized as the storage key `"{week}-{day}-{slot}"`
/// so it can double as a JSON map key and a database column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
  pub week: u32,
  pub day: Weekday,
  pub slot: u32,
}

impl SlotKey {
  pub fn new(week: u32, day: Weekday, slot: u32) -> Self {
    Self { week, day, slot }
  }

  pub fn storage_key(&self) -> String {
    format!("{}-{}-{}", self.week, self.day, self.slot)
  }

  pub fn is_primary(&self) -> bool {
    self.slot == 0
  }

  /// The same day, next slot index up
  pub fn next_slot(&self) -> Self {
    Self {
      slot: self.slot + 1,
      ..*self
    }
  }
}

impl std::fmt::Display for SlotKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.storage_key())
  }
}

impl FromStr for SlotKey {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
      return Err(format!("Malformed slot key: {}", s));
    }
    let week: u32 = parts[0]
      .parse()
      .map_err(|_| format!("Bad week in slot key: {}", s))?;
    let day: Weekday = parts[1].parse()?;
    let slot: u32 = parts[2]
      .parse()
      .map_err(|_| format!("Bad slot index in slot key: {}", s))?;
    Ok(Self { week, day, slot })
  }
}

impl Serialize for SlotKey {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&self.storage_key())
  }
}

impl<'de> Deserialize<'de> for SlotKey {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// ---------------------------------------------------------------------------
/// Completion Record
/// ---------------------------------------------------------------------------

/// User- or import-supplied completion state for one slot. Lifecycle is
/// independent from the modified overlay: a slot can be completed without
/// being edited, edited without being completed, both, or neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
  pub completed: bool,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,

  /// Actual distance covered, in miles
  #[serde(skip_serializing_if = "Option::is_none")]
  pub actual_distance: Option<f64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_seconds: Option<i64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub average_heartrate: Option<i64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub pace_min_per_mile: Option<f64>,

  /// Elevation gain in feet
  #[serde(skip_serializing_if = "Option::is_none")]
  pub elevation_gain: Option<f64>,

  /// Link back to the imported activity, when synced from a tracker
  #[serde(skip_serializing_if = "Option::is_none")]
  pub external_url: Option<String>,
}

impl CompletionRecord {
  /// Minimal manual-entry record
  pub fn manual(completed: bool) -> Self {
    Self {
      completed,
      completed_at: completed.then(Utc::now),
      ..Self::default()
    }
  }
}

/// ---------------------------------------------------------------------------
/// Overlay Maps
/// ---------------------------------------------------------------------------

/// Which overlay layer a persisted entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
  Modified,
  Completion,
}

impl std::fmt::Display for OverlayKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Modified => write!(f, "modified"),
      Self::Completion => write!(f, "completion"),
    }
  }
}

impl FromStr for OverlayKind {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "modified" => Ok(Self::Modified),
      "completion" => Ok(Self::Completion),
      _ => Err(format!("Unknown overlay kind: {}", s)),
    }
  }
}

/// Sparse map of slot key -> replacement workout payload.
///
/// Absence at slot 0 means "use the base day slot". Presence at slot >= 1
/// means an additional session exists for that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedOverlay(BTreeMap<SlotKey, DaySlot>);

/// Sparse map of slot key -> completion record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOverlay(BTreeMap<SlotKey, CompletionRecord>);

macro_rules! overlay_map_impl {
  ($name:ident, $value:ty) => {
    impl $name {
      pub fn new() -> Self {
        Self(BTreeMap::new())
      }

      pub fn get(&self, key: &SlotKey) -> Option<&$value> {
        self.0.get(key)
      }

      pub fn insert(&mut self, key: SlotKey, value: $value) -> Option<$value> {
        self.0.insert(key, value)
      }

      pub fn remove(&mut self, key: &SlotKey) -> Option<$value> {
        self.0.remove(key)
      }

      pub fn contains(&self, key: &SlotKey) -> bool {
        self.0.contains_key(key)
      }

      pub fn len(&self) -> usize {
        self.0.len()
      }

      pub fn is_empty(&self) -> bool {
        self.0.is_empty()
      }

      pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &$value)> {
        self.0.iter()
      }

      /// All entries for one (week, day), in slot order
      pub fn for_day(
        &self,
        week: u32,
        day: Weekday,
      ) -> impl Iterator<Item = (&SlotKey, &$value)> {
        self
          .0
          .iter()
          .filter(move |(k, _)| k.week == week && k.day == day)
      }
    }
  };
}

overlay_map_impl!(ModifiedOverlay, DaySlot);
overlay_map_impl!(CompletionOverlay, CompletionRecord);

/// ---------------------------------------------------------------------------
/// Resolved Workout
/// ---------------------------------------------------------------------------

/// The read-only, UI-facing materialization of one slot: base-or-modified
/// payload merged with completion state and an annotated calendar date.
/// Never persisted; recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedWorkout {
  pub key: SlotKey,
  pub day: Weekday,

  /// Normalized category, derived once at resolution time
  pub workout_type: WorkoutType,

  /// Raw tag as it appeared in the source payload
  pub raw_type: String,

  pub name: String,
  pub description: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub distance: Option<f64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub focus: Option<String>,

  /// Whether this slot came from the modified overlay
  pub modified: bool,

  pub completed: bool,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub completion: Option<CompletionRecord>,

  /// Concrete calendar date; None when the calendar is degraded
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<NaiveDate>,

  /// 1-based position among the day's sessions ("Workout 1/2")
  pub session_index: u32,
  pub session_count: u32,
}

impl ResolvedWorkout {
  pub fn from_slot(
    key: SlotKey,
    slot: &DaySlot,
    modified: bool,
    completion: Option<&CompletionRecord>,
    date: Option<NaiveDate>,
  ) -> Self {
    Self {
      key,
      day: slot.day,
      workout_type: WorkoutType::normalize(&slot.workout_type, &slot.workout.name),
      raw_type: slot.workout_type.clone(),
      name: slot.workout.name.clone(),
      description: slot.workout.description.clone(),
      distance: slot.distance,
      focus: slot.focus.clone(),
      modified,
      completed: completion.map_or(false, |c| c.completed),
      completion: completion.cloned(),
      date,
      session_index: key.slot + 1,
      session_count: 1,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
