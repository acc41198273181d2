//! Overlay resolution: reconstructing what a day actually shows.
//!
//! Walks slot indices per day: slot 0 is base-or-modified, slots >= 1 only
//! exist while the modified overlay has contiguous entries. The walk stops
//! at the first gap, which is why slot removal must compact — a skipped
//! compaction silently hides valid later sessions.

use serde::Serialize;
use thiserror::Error;

use crate::calendar::PlanCalendar;
use crate::models::overlay::{
  CompletionOverlay, ModifiedOverlay, ResolvedWorkout, SlotKey,
};
use crate::models::plan::{DaySlot, Week, Weekday};

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ResolveError {
  /// Slot 0 can only be replaced via the modified overlay, never removed
  #[error("The primary slot cannot be removed, only replaced")]
  PrimarySlotImmutable,

  #[error("No session at slot {0}")]
  SlotNotFound(SlotKey),
}

impl Serialize for ResolveError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Day Resolution
/// ---------------------------------------------------------------------------

/// Resolve one day into its ordered session list.
///
/// Base days never have implicit additional slots: when slot 0 has no
/// overlay entry, the base slot is emitted and the walk ends. Orphaned
/// completion records (for slots that no longer resolve) are ignored.
pub fn resolve_day(
  week_number: u32,
  base: &DaySlot,
  modified: &ModifiedOverlay,
  completions: &CompletionOverlay,
  calendar: &PlanCalendar,
) -> Vec<ResolvedWorkout> {
  let mut resolved = Vec::new();
  let date = calendar.date_for_day(week_number, base.day);

  let mut key = SlotKey::new(week_number, base.day, 0);
  loop {
    match modified.get(&key) {
      Some(replacement) => {
        resolved.push(ResolvedWorkout::from_slot(
          key,
          replacement,
          true,
          completions.get(&key),
          date,
        ));
        key = key.next_slot();
      }
      None if key.is_primary() => {
        resolved.push(ResolvedWorkout::from_slot(
          key,
          base,
          false,
          completions.get(&key),
          date,
        ));
        break;
      }
      None => break,
    }
  }

  let count = resolved.len() as u32;
  for workout in &mut resolved {
    workout.session_count = count;
  }
  resolved
}

/// Resolve a full week, in the base plan's day order
pub fn resolve_week(
  week: &Week,
  modified: &ModifiedOverlay,
  completions: &CompletionOverlay,
  calendar: &PlanCalendar,
) -> Vec<ResolvedWorkout> {
  week
    .workouts
    .iter()
    .flat_map(|base| resolve_day(week.week_number, base, modified, completions, calendar))
    .collect()
}

/// ---------------------------------------------------------------------------
/// Slot Removal & Compaction
/// ---------------------------------------------------------------------------

/// Remove an added session and renumber every later slot for the same day
/// down by one, in both overlays, so slot indices stay contiguous.
/// Completion records travel with their workout's new key.
pub fn remove_slot(
  modified: &mut ModifiedOverlay,
  completions: &mut CompletionOverlay,
  week_number: u32,
  day: Weekday,
  index: u32,
) -> Result<(), ResolveError> {
  if index == 0 {
    return Err(ResolveError::PrimarySlotImmutable);
  }

  let removed_key = SlotKey::new(week_number, day, index);
  if modified.remove(&removed_key).is_none() {
    return Err(ResolveError::SlotNotFound(removed_key));
  }
  completions.remove(&removed_key);

  // Shift contiguous later slots down into the gap
  let mut from = SlotKey::new(week_number, day, index + 1);
  loop {
    let to = SlotKey::new(week_number, day, from.slot - 1);
    match modified.remove(&from) {
      Some(workout) => {
        modified.insert(to, workout);
        if let Some(record) = completions.remove(&from) {
          completions.insert(to, record);
        }
        from = from.next_slot();
      }
      None => break,
    }
  }

  Ok(())
}

/// Slot index where the next added session for a day would land
pub fn next_open_slot(modified: &ModifiedOverlay, week_number: u32, day: Weekday) -> u32 {
  let mut slot = 1;
  while modified.contains(&SlotKey::new(week_number, day, slot)) {
    slot += 1;
  }
  slot
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::overlay::CompletionRecord;
  use crate::models::plan::{Workout, WorkoutType};

  fn base_slot(day: Weekday) -> DaySlot {
    DaySlot {
      day,
      workout_type: "tempo".to_string(),
      workout: Workout {
        name: "6-Mile Tempo".to_string(),
        description: "2 easy, 3 at tempo, 1 easy".to_string(),
      },
      distance: None,
      focus: None,
    }
  }

  fn extra_slot(day: Weekday, name: &str) -> DaySlot {
    DaySlot {
      day,
      workout_type: "easy".to_string(),
      workout: Workout {
        name: name.to_string(),
        description: "Added session".to_string(),
      },
      distance: None,
      focus: None,
    }
  }

  fn degraded() -> PlanCalendar {
    PlanCalendar::from_start_date(None)
  }

  #[test]
  fn test_base_day_without_overlay_resolves_to_base() {
    let base = base_slot(Weekday::Tuesday);
    let resolved = resolve_day(
      1,
      &base,
      &ModifiedOverlay::new(),
      &CompletionOverlay::new(),
      &degraded(),
    );

    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].name, "6-Mile Tempo");
    assert_eq!(resolved[0].workout_type, WorkoutType::Tempo);
    assert!(!resolved[0].modified);
    assert!(!resolved[0].completed);
    assert_eq!(resolved[0].session_count, 1);
  }

  #[test]
  fn test_modified_slot_zero_replaces_base() {
    let base = base_slot(Weekday::Tuesday);
    let mut modified = ModifiedOverlay::new();
    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 0),
      extra_slot(Weekday::Tuesday, "5 Mile Fartlek"),
    );

    let resolved = resolve_day(1, &base, &modified, &CompletionOverlay::new(), &degraded());
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].name, "5 Mile Fartlek");
    assert!(resolved[0].modified);
  }

  #[test]
  fn test_two_a_day_resolves_in_slot_order() {
    let base = base_slot(Weekday::Tuesday);
    let mut modified = ModifiedOverlay::new();
    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 1),
      extra_slot(Weekday::Tuesday, "Evening Shakeout"),
    );

    let resolved = resolve_day(1, &base, &modified, &CompletionOverlay::new(), &degraded());
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].name, "6-Mile Tempo");
    assert_eq!(resolved[1].name, "Evening Shakeout");
    assert_eq!(resolved[0].session_index, 1);
    assert_eq!(resolved[1].session_index, 2);
    assert_eq!(resolved[0].session_count, 2);
    assert_eq!(resolved[1].session_count, 2);
  }

  #[test]
  fn test_inserting_slot_one_never_perturbs_slot_zero() {
    let base = base_slot(Weekday::Tuesday);
    let empty = ModifiedOverlay::new();
    let before = resolve_day(1, &base, &empty, &CompletionOverlay::new(), &degraded());

    let mut modified = ModifiedOverlay::new();
    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 1),
      extra_slot(Weekday::Tuesday, "Evening Shakeout"),
    );
    let after = resolve_day(1, &base, &modified, &CompletionOverlay::new(), &degraded());

    assert_eq!(before[0].name, after[0].name);
    assert_eq!(before[0].key, after[0].key);
  }

  #[test]
  fn test_gap_in_slot_sequence_hides_later_sessions() {
    // Slot 2 present without slot 1: the walk stops at the gap. This is
    // the failure mode compaction exists to prevent.
    let base = base_slot(Weekday::Tuesday);
    let mut modified = ModifiedOverlay::new();
    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 2),
      extra_slot(Weekday::Tuesday, "Hidden Session"),
    );

    let resolved = resolve_day(1, &base, &modified, &CompletionOverlay::new(), &degraded());
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].name, "6-Mile Tempo");
  }

  #[test]
  fn test_completion_annotation() {
    let base = base_slot(Weekday::Tuesday);
    let mut completions = CompletionOverlay::new();
    let mut record = CompletionRecord::manual(true);
    record.actual_distance = Some(6.2);
    completions.insert(SlotKey::new(1, Weekday::Tuesday, 0), record);

    let resolved = resolve_day(1, &base, &ModifiedOverlay::new(), &completions, &degraded());
    assert!(resolved[0].completed);
    assert_eq!(
      resolved[0].completion.as_ref().unwrap().actual_distance,
      Some(6.2)
    );
  }

  #[test]
  fn test_orphaned_completion_record_is_ignored() {
    let base = base_slot(Weekday::Tuesday);
    let mut completions = CompletionOverlay::new();
    completions.insert(
      SlotKey::new(1, Weekday::Tuesday, 5),
      CompletionRecord::manual(true),
    );

    let resolved = resolve_day(1, &base, &ModifiedOverlay::new(), &completions, &degraded());
    assert_eq!(resolved.len(), 1);
    assert!(!resolved[0].completed);
  }

  #[test]
  fn test_remove_primary_slot_is_rejected() {
    let mut modified = ModifiedOverlay::new();
    let mut completions = CompletionOverlay::new();
    let err = remove_slot(&mut modified, &mut completions, 1, Weekday::Tuesday, 0);
    assert!(matches!(err, Err(ResolveError::PrimarySlotImmutable)));
  }

  #[test]
  fn test_remove_missing_slot_is_an_error() {
    let mut modified = ModifiedOverlay::new();
    let mut completions = CompletionOverlay::new();
    let err = remove_slot(&mut modified, &mut completions, 1, Weekday::Tuesday, 1);
    assert!(matches!(err, Err(ResolveError::SlotNotFound(_))));
  }

  #[test]
  fn test_remove_slot_compacts_and_moves_completions() {
    // Write slot 1, then slot 2, then remove slot 1: exactly one extra
    // session remains (the former slot 2, renumbered) — no gap, no dup.
    let base = base_slot(Weekday::Tuesday);
    let mut modified = ModifiedOverlay::new();
    let mut completions = CompletionOverlay::new();

    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 1),
      extra_slot(Weekday::Tuesday, "Lunch Spin"),
    );
    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 2),
      extra_slot(Weekday::Tuesday, "Evening Shakeout"),
    );
    completions.insert(
      SlotKey::new(1, Weekday::Tuesday, 2),
      CompletionRecord::manual(true),
    );

    remove_slot(&mut modified, &mut completions, 1, Weekday::Tuesday, 1).unwrap();

    let resolved = resolve_day(1, &base, &modified, &completions, &degraded());
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[1].name, "Evening Shakeout");
    assert_eq!(resolved[1].key.slot, 1);
    // Its completion record moved with it
    assert!(resolved[1].completed);
    assert!(!completions.contains(&SlotKey::new(1, Weekday::Tuesday, 2)));
  }

  #[test]
  fn test_next_open_slot() {
    let mut modified = ModifiedOverlay::new();
    assert_eq!(next_open_slot(&modified, 1, Weekday::Tuesday), 1);

    modified.insert(
      SlotKey::new(1, Weekday::Tuesday, 1),
      extra_slot(Weekday::Tuesday, "Lunch Spin"),
    );
    assert_eq!(next_open_slot(&modified, 1, Weekday::Tuesday), 2);
  }

  #[test]
  fn test_resolve_week_keeps_day_order() {
    let week = Week {
      week_number: 1,
      phase: crate::models::plan::Phase::Base,
      workouts: vec![base_slot(Weekday::Monday), base_slot(Weekday::Thursday)],
      total_mileage: None,
    };
    let resolved = resolve_week(
      &week,
      &ModifiedOverlay::new(),
      &CompletionOverlay::new(),
      &degraded(),
    );
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].day, Weekday::Monday);
    assert_eq!(resolved[1].day, Weekday::Thursday);
  }

  #[test]
  fn test_dates_annotated_when_calendar_present() {
    let cal = PlanCalendar::from_start_date(chrono::NaiveDate::from_ymd_opt(2025, 11, 25));
    let base = base_slot(Weekday::Tuesday);
    let resolved = resolve_day(2, &base, &ModifiedOverlay::new(), &CompletionOverlay::new(), &cal);
    assert_eq!(
      resolved[0].date,
      chrono::NaiveDate::from_ymd_opt(2025, 12, 2)
    );
  }
}
