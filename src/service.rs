//! Engine façade consumed by the presentation layer.
//!
//! All reads are pure recomputations over an explicit snapshot of
//! (plan, modified overlay, completion overlay) — the UI is only ever a
//! consumer of `ResolvedWorkout` lists. Overlay writes apply to the
//! snapshot first and roll back if the background persistence write
//! fails: the toggle is never blocked, and a failed write is never
//! silently retained. Regeneration is all-or-nothing.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::calendar::PlanCalendar;
use crate::generator::{AthleteProfile, GeneratorError, WeekGenerator};
use crate::mileage::{week_mileage, WeekMileage};
use crate::models::overlay::{
  CompletionOverlay, CompletionRecord, ModifiedOverlay, ResolvedWorkout, SlotKey,
};
use crate::models::plan::{DaySlot, Phase, Plan, Weekday};
use crate::reconciler::{merge_plans, ReconcileError};
use crate::resolver::{next_open_slot, remove_slot, resolve_week, ResolveError};
use crate::store::{PlanStore, StoreError};

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("No plan found for this user")]
  NoPlan,

  #[error("Week {0} is not part of the plan")]
  UnknownWeek(u32),

  #[error("A regeneration is already in progress")]
  RegenerationInFlight,

  #[error("Storage error: {0}")]
  Store(#[from] StoreError),

  #[error("Generator error: {0}")]
  Generator(#[from] GeneratorError),

  #[error("{0}")]
  Reconcile(#[from] ReconcileError),

  #[error("{0}")]
  Resolve(#[from] ResolveError),
}

impl Serialize for ServiceError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Session Snapshot
/// ---------------------------------------------------------------------------

/// One user's loaded state: the plan skeleton plus both overlay layers.
/// Reads resolve against this snapshot; writes go through `PlanService`
/// so the snapshot and the store stay in step.
pub struct PlanSession {
  user_id: String,
  plan: Plan,
  calendar: PlanCalendar,
  modified: ModifiedOverlay,
  completions: CompletionOverlay,
}

/// A resolved week plus its aggregates, ready for display
#[derive(Debug, Clone, Serialize)]
pub struct WeekView {
  pub week_number: u32,
  pub phase: Phase,

  /// Monday..Sunday, None when the calendar is degraded
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date_range: Option<(NaiveDate, NaiveDate)>,

  pub workouts: Vec<ResolvedWorkout>,
  pub mileage: WeekMileage,
}

impl PlanSession {
  pub fn user_id(&self) -> &str {
    &self.user_id
  }

  pub fn plan(&self) -> &Plan {
    &self.plan
  }

  pub fn calendar(&self) -> &PlanCalendar {
    &self.calendar
  }

  pub fn current_week(&self, today: NaiveDate) -> u32 {
    self.calendar.current_week(today, self.plan.total_weeks)
  }

  /// Resolve one week against the overlay snapshot
  pub fn week_view(&self, week_number: u32) -> Result<WeekView, ServiceError> {
    let week = self
      .plan
      .week(week_number)
      .ok_or(ServiceError::UnknownWeek(week_number))?;

    let workouts = resolve_week(week, &self.modified, &self.completions, &self.calendar);
    let mileage = week_mileage(&workouts, week.total_mileage);

    Ok(WeekView {
      week_number,
      phase: week.phase,
      date_range: self.calendar.week_range(week_number),
      workouts,
      mileage,
    })
  }

  pub fn current_week_view(&self, today: NaiveDate) -> Result<WeekView, ServiceError> {
    self.week_view(self.current_week(today))
  }
}

/// ---------------------------------------------------------------------------
/// Plan Service
/// ---------------------------------------------------------------------------

pub struct PlanService {
  store: PlanStore,
  regenerating: AtomicBool,
}

/// Releases the regeneration flag when the merge path unwinds
struct RegenGuard<'a>(&'a AtomicBool);

impl Drop for RegenGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

impl PlanService {
  pub fn new(store: PlanStore) -> Self {
    Self {
      store,
      regenerating: AtomicBool::new(false),
    }
  }

  pub async fn load_session(&self, user_id: &str) -> Result<PlanSession, ServiceError> {
    let plan = self
      .store
      .get_plan(user_id)
      .await?
      .ok_or(ServiceError::NoPlan)?;

    let calendar = PlanCalendar::from_plan(&plan);
    let modified = self.store.get_modified_overlay(user_id).await?;
    let completions = self.store.get_completion_overlay(user_id).await?;

    Ok(PlanSession {
      user_id: user_id.to_string(),
      plan,
      calendar,
      modified,
      completions,
    })
  }

  /// Record completion state for a slot. Applied to the snapshot
  /// immediately; rolled back if the persistence write fails.
  pub async fn set_completion(
    &self,
    session: &mut PlanSession,
    key: SlotKey,
    record: CompletionRecord,
  ) -> Result<(), ServiceError> {
    let previous = session.completions.insert(key, record.clone());

    if let Err(e) = self
      .store
      .set_completion_entry(&session.user_id, &key, &record)
      .await
    {
      tracing::warn!(user_id = %session.user_id, key = %key, "completion write failed, rolling back");
      match previous {
        Some(prev) => session.completions.insert(key, prev),
        None => session.completions.remove(&key),
      };
      return Err(e.into());
    }
    Ok(())
  }

  /// Replace a slot's workout ("do something else"), or the payload of an
  /// added session. Same optimistic contract as `set_completion`.
  pub async fn edit_workout(
    &self,
    session: &mut PlanSession,
    key: SlotKey,
    replacement: DaySlot,
  ) -> Result<(), ServiceError> {
    let previous = session.modified.insert(key, replacement.clone());

    if let Err(e) = self
      .store
      .set_modified_entry(&session.user_id, &key, &replacement)
      .await
    {
      tracing::warn!(user_id = %session.user_id, key = %key, "edit write failed, rolling back");
      match previous {
        Some(prev) => session.modified.insert(key, prev),
        None => session.modified.remove(&key),
      };
      return Err(e.into());
    }
    Ok(())
  }

  /// Add a second (or third, ...) session to a day. Returns the key the
  /// new session landed on.
  pub async fn add_session(
    &self,
    session: &mut PlanSession,
    week_number: u32,
    day: Weekday,
    workout: DaySlot,
  ) -> Result<SlotKey, ServiceError> {
    let slot = next_open_slot(&session.modified, week_number, day);
    let key = SlotKey::new(week_number, day, slot);
    self.edit_workout(session, key, workout).await?;
    Ok(key)
  }

  /// Remove an added session and compact the remaining slot indices.
  /// Compaction shifts several keys at once, so the whole rewrite is
  /// staged on clones and committed only after the store accepts it.
  pub async fn remove_session(
    &self,
    session: &mut PlanSession,
    week_number: u32,
    day: Weekday,
    index: u32,
  ) -> Result<(), ServiceError> {
    let mut modified = session.modified.clone();
    let mut completions = session.completions.clone();
    remove_slot(&mut modified, &mut completions, week_number, day, index)?;

    self
      .store
      .replace_overlays(&session.user_id, &modified, &completions)
      .await?;

    session.modified = modified;
    session.completions = completions;
    Ok(())
  }

  /// Regenerate the plan from the current week onward.
  ///
  /// Fetch -> generate -> merge -> persist, all-or-nothing: if the
  /// generator fails, the merge rejects, or the save fails, the stored
  /// plan and the session snapshot are left exactly as they were. A
  /// second call while one is outstanding is rejected outright.
  pub async fn regenerate(
    &self,
    session: &mut PlanSession,
    generator: &dyn WeekGenerator,
    profile: &AthleteProfile,
    today: NaiveDate,
  ) -> Result<u32, ServiceError> {
    if self.regenerating.swap(true, Ordering::SeqCst) {
      return Err(ServiceError::RegenerationInFlight);
    }
    let _guard = RegenGuard(&self.regenerating);

    let backup = session.plan.clone();
    let current_week = session.current_week(today);
    let remaining = backup.total_weeks.saturating_sub(current_week) + 1;

    let replacement = generator
      .generate_weeks(profile, current_week, remaining)
      .await?;

    let merged = merge_plans(&backup, &replacement, current_week)?;
    self.store.save_plan(&session.user_id, &merged).await?;

    session.plan = merged;
    session.calendar = PlanCalendar::from_plan(&session.plan);
    Ok(current_week)
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use async_trait::async_trait;
  use tokio::sync::Notify;

  use crate::models::plan::Week;
  use crate::test_utils::{
    make_completion, make_day_slot, make_test_week, seed_test_plan, setup_test_db,
    teardown_test_db,
  };

  fn profile() -> AthleteProfile {
    AthleteProfile {
      goal: "Half marathon".to_string(),
      experience: "intermediate".to_string(),
      days_per_week: 5,
      current_weekly_mileage: Some(25.0),
      notes: None,
    }
  }

  fn today() -> NaiveDate {
    // Week 2 of a plan that started Tuesday 2025-11-25
    NaiveDate::from_ymd_opt(2025, 12, 2).unwrap()
  }

  fn regenerated_week(week_number: u32) -> Week {
    let mut week = make_test_week(week_number);
    for slot in &mut week.workouts {
      slot.workout.name = format!("Regenerated {}", slot.workout.name);
    }
    week
  }

  struct MockGenerator {
    weeks: Vec<Week>,
  }

  #[async_trait]
  impl WeekGenerator for MockGenerator {
    async fn generate_weeks(
      &self,
      _profile: &AthleteProfile,
      _from_week: u32,
      _week_count: u32,
    ) -> Result<Vec<Week>, GeneratorError> {
      Ok(self.weeks.clone())
    }
  }

  struct FailingGenerator;

  #[async_trait]
  impl WeekGenerator for FailingGenerator {
    async fn generate_weeks(
      &self,
      _profile: &AthleteProfile,
      _from_week: u32,
      _week_count: u32,
    ) -> Result<Vec<Week>, GeneratorError> {
      Err(GeneratorError::Api("overloaded".to_string()))
    }
  }

  /// Signals `entered` on call, then parks until `gate` fires
  struct BlockingGenerator {
    entered: Arc<Notify>,
    gate: Arc<Notify>,
  }

  #[async_trait]
  impl WeekGenerator for BlockingGenerator {
    async fn generate_weeks(
      &self,
      _profile: &AthleteProfile,
      from_week: u32,
      _week_count: u32,
    ) -> Result<Vec<Week>, GeneratorError> {
      self.entered.notify_one();
      self.gate.notified().await;
      Ok(vec![regenerated_week(from_week)])
    }
  }

  #[tokio::test]
  async fn test_load_session_requires_a_plan() {
    let pool = setup_test_db().await;
    let service = PlanService::new(PlanStore::new(pool.clone()));

    let err = service.load_session("nobody").await;
    assert!(matches!(err, Err(ServiceError::NoPlan)));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_week_view_resolves_and_aggregates() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let session = service.load_session("athlete-1").await.unwrap();

    let view = session.week_view(1).unwrap();
    assert_eq!(view.workouts.len(), 5);
    assert!(view.date_range.is_some());
    // tempo 6 + easy 4 + intervals default 5 + long run 10
    assert_eq!(view.mileage.run_miles, 25.0);

    assert!(matches!(
      session.week_view(13),
      Err(ServiceError::UnknownWeek(13))
    ));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_current_week_view_follows_the_calendar() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let session = service.load_session("athlete-1").await.unwrap();

    let view = session.current_week_view(today()).unwrap();
    assert_eq!(view.week_number, 2);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_set_completion_is_persisted() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let mut session = service.load_session("athlete-1").await.unwrap();

    let key = SlotKey::new(1, Weekday::Tuesday, 0);
    service
      .set_completion(&mut session, key, make_completion(6.2))
      .await
      .unwrap();

    // Visible in the snapshot immediately
    let view = session.week_view(1).unwrap();
    let tuesday = view.workouts.iter().find(|w| w.key == key).unwrap();
    assert!(tuesday.completed);

    // And durably in the store
    let reloaded = service.load_session("athlete-1").await.unwrap();
    assert!(reloaded.week_view(1).unwrap().workouts.iter().any(|w| w.completed));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_failed_completion_write_rolls_back() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let mut session = service.load_session("athlete-1").await.unwrap();

    // Sever the store: every subsequent write must fail
    pool.close().await;

    let key = SlotKey::new(1, Weekday::Tuesday, 0);
    let err = service
      .set_completion(&mut session, key, make_completion(6.2))
      .await;

    assert!(matches!(err, Err(ServiceError::Store(_))));
    // The optimistic entry was rolled back, not retained
    let view = session.week_view(1).unwrap();
    assert!(view.workouts.iter().all(|w| !w.completed));
  }

  #[tokio::test]
  async fn test_add_and_remove_session_roundtrip() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let mut session = service.load_session("athlete-1").await.unwrap();

    let first = service
      .add_session(
        &mut session,
        2,
        Weekday::Tuesday,
        make_day_slot(Weekday::Tuesday, "easy", "Lunch Spin"),
      )
      .await
      .unwrap();
    let second = service
      .add_session(
        &mut session,
        2,
        Weekday::Tuesday,
        make_day_slot(Weekday::Tuesday, "easy", "Evening Shakeout"),
      )
      .await
      .unwrap();
    assert_eq!(first.slot, 1);
    assert_eq!(second.slot, 2);

    service
      .remove_session(&mut session, 2, Weekday::Tuesday, 1)
      .await
      .unwrap();

    // Former slot 2 renumbered to 1, both in the snapshot and the store
    let view = session.week_view(2).unwrap();
    let tuesday: Vec<_> = view
      .workouts
      .iter()
      .filter(|w| w.day == Weekday::Tuesday)
      .collect();
    assert_eq!(tuesday.len(), 2);
    assert_eq!(tuesday[1].name, "Evening Shakeout");
    assert_eq!(tuesday[1].key.slot, 1);

    let reloaded = service.load_session("athlete-1").await.unwrap();
    let view = reloaded.week_view(2).unwrap();
    assert!(view.workouts.iter().any(|w| w.name == "Evening Shakeout"));
    assert!(view.workouts.iter().all(|w| w.name != "Lunch Spin"));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_regenerate_replaces_future_and_preserves_history() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let mut session = service.load_session("athlete-1").await.unwrap();

    let generator = MockGenerator {
      weeks: (0..4).map(|i| regenerated_week(i + 2)).collect(),
    };
    let merged_at = service
      .regenerate(&mut session, &generator, &profile(), today())
      .await
      .unwrap();
    assert_eq!(merged_at, 2);

    // Week 1 untouched, weeks 2..5 regenerated, plan truncated to 5
    assert_eq!(session.plan().total_weeks, 5);
    assert_eq!(
      session.plan().week(1).unwrap().workouts[1].workout.name,
      "6-Mile Tempo"
    );
    assert!(session.plan().week(2).unwrap().workouts[1]
      .workout
      .name
      .starts_with("Regenerated"));

    let stored = PlanStore::new(pool.clone())
      .get_plan("athlete-1")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(&stored, session.plan());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_regenerate_failure_leaves_everything_untouched() {
    let pool = setup_test_db().await;
    let seeded = seed_test_plan(&pool, "athlete-1", 12).await;
    let service = PlanService::new(PlanStore::new(pool.clone()));
    let mut session = service.load_session("athlete-1").await.unwrap();

    let before = serde_json::to_string(&seeded).unwrap();
    let err = service
      .regenerate(&mut session, &FailingGenerator, &profile(), today())
      .await;
    assert!(matches!(err, Err(ServiceError::Generator(_))));

    let stored = PlanStore::new(pool.clone())
      .get_plan("athlete-1")
      .await
      .unwrap()
      .unwrap();
    assert_eq!(serde_json::to_string(&stored).unwrap(), before);
    assert_eq!(serde_json::to_string(session.plan()).unwrap(), before);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_reentrant_regeneration_is_rejected() {
    let pool = setup_test_db().await;
    seed_test_plan(&pool, "athlete-1", 12).await;
    let service = Arc::new(PlanService::new(PlanStore::new(pool.clone())));

    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let generator = Arc::new(BlockingGenerator {
      entered: entered.clone(),
      gate: gate.clone(),
    });

    let first = {
      let service = service.clone();
      let generator = generator.clone();
      tokio::spawn(async move {
        let mut session = service.load_session("athlete-1").await.unwrap();
        service
          .regenerate(&mut session, generator.as_ref(), &profile(), today())
          .await
      })
    };

    // Once the first call is parked inside the generator, a second
    // trigger must be refused rather than queued
    entered.notified().await;
    let mut session = service.load_session("athlete-1").await.unwrap();
    let err = service
      .regenerate(&mut session, &FailingGenerator, &profile(), today())
      .await;
    assert!(matches!(err, Err(ServiceError::RegenerationInFlight)));

    gate.notify_one();
    first.await.unwrap().unwrap();

    teardown_test_db(pool).await;
  }
}
