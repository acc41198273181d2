//! Imported-activity boundary.
//!
//! A third-party activity sync (GPS watch, Strava-style export) supplies
//! candidate completion data. Matching an activity to a day slot is the
//! importer's problem, not the engine's; this module only shapes the
//! record so that an imported completion populates exactly the same
//! fields as manual entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::overlay::CompletionRecord;

const METERS_PER_MILE: f64 = 1609.344;
const FEET_PER_METER: f64 = 3.28084;

/// One synced activity, as delivered by the import pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedActivity {
  pub id: i64,
  pub name: String,
  pub activity_type: String,
  pub start_date: DateTime<Utc>,
  pub moving_time: i64,

  /// Meters, as trackers report it
  pub distance: Option<f64>,

  pub total_elevation_gain: Option<f64>,
  pub average_heartrate: Option<f64>,
  pub external_url: Option<String>,
}

/// Build a completion record from a synced activity
pub fn completion_from_activity(activity: &ImportedActivity) -> CompletionRecord {
  let miles = activity
    .distance
    .filter(|m| *m > 0.0)
    .map(|m| m / METERS_PER_MILE);

  let pace_min_per_mile = match (miles, activity.moving_time) {
    (Some(mi), secs) if mi > 0.0 && secs > 0 => Some(secs as f64 / 60.0 / mi),
    _ => None,
  };

  CompletionRecord {
    completed: true,
    completed_at: Some(activity.start_date),
    actual_distance: miles,
    notes: None,
    duration_seconds: Some(activity.moving_time),
    average_heartrate: activity.average_heartrate.map(|hr| hr.round() as i64),
    pace_min_per_mile,
    elevation_gain: activity.total_elevation_gain.map(|m| m * FEET_PER_METER),
    external_url: activity.external_url.clone(),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
