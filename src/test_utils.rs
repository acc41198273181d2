//! Test utilities and helpers for integration and unit testing
//!
//! Common infrastructure for engine tests: database setup/teardown,
//! plan and overlay factories, and helper assertions.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::models::overlay::CompletionRecord;
use crate::models::plan::{DaySlot, Phase, Plan, Week, Weekday, Workout};
use crate::store::PlanStore;

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Persist a freshly built plan for a user and return it
pub async fn seed_test_plan(pool: &SqlitePool, user_id: &str, total_weeks: u32) -> Plan {
  let plan = make_test_plan(total_weeks);
  PlanStore::new(pool.clone())
    .save_plan(user_id, &plan)
    .await
    .expect("Failed to seed plan");
  plan
}

/// ---------------------------------------------------------------------------
/// Plan Factories
/// ---------------------------------------------------------------------------

pub fn make_day_slot(day: Weekday, type_tag: &str, name: &str) -> DaySlot {
  DaySlot {
    day,
    workout_type: type_tag.to_string(),
    workout: Workout {
      name: name.to_string(),
      description: format!("{} as prescribed", name),
    },
    distance: None,
    focus: None,
  }
}

/// A typical training week: two quality days, two easy days, a long run
pub fn make_test_week(week_number: u32) -> Week {
  Week {
    week_number,
    phase: Phase::Base,
    workouts: vec![
      make_day_slot(Weekday::Monday, "rest", "Rest Day"),
      make_day_slot(Weekday::Tuesday, "tempo", "6-Mile Tempo"),
      make_day_slot(Weekday::Wednesday, "easy", "4 Mile Easy Run"),
      make_day_slot(Weekday::Thursday, "intervals", "6x400m Intervals"),
      make_day_slot(Weekday::Saturday, "longRun", "10-Mile Long Run"),
    ],
    total_mileage: None,
  }
}

/// A materialized plan starting Tuesday 2025-11-25 (mid-week start)
pub fn make_test_plan(total_weeks: u32) -> Plan {
  Plan {
    start_date: NaiveDate::from_ymd_opt(2025, 11, 25),
    total_weeks,
    weeks: (1..=total_weeks).map(make_test_week).collect(),
  }
}

/// A completion record the way a manual check-off plus a distance edit
/// would produce it
pub fn make_completion(actual_distance: f64) -> CompletionRecord {
  CompletionRecord {
    completed: true,
    completed_at: Some(Utc::now()),
    actual_distance: Some(actual_distance),
    ..CompletionRecord::default()
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------
