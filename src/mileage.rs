//! Weekly mileage aggregation under the cross-modality equivalency model.
//!
//! Display text is the only distance source for legacy content, so
//! extraction is a documented priority cascade over free text, isolated
//! behind `extract_distance`. Conversion ratios are fixed: 3 bike miles
//! and 2 elliptical miles each equal 1 run-equivalent mile. RunEQ-labeled
//! distances are already equivalenced and must never be converted again.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::overlay::ResolvedWorkout;
use crate::models::plan::WorkoutType;

pub const BIKE_MILES_PER_RUN_MILE: f64 = 3.0;
pub const ELLIPTICAL_MILES_PER_RUN_MILE: f64 = 2.0;

/// ---------------------------------------------------------------------------
/// Extraction Patterns
/// ---------------------------------------------------------------------------

fn runeq_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*RunEQ\s+miles?").expect("valid RunEQ pattern")
  })
}

/// `"6-Mile Tempo"` / `"4 miles easy"`; the unit token must be a mile word,
/// so interval markers like `400m` or `5km` never match
fn mile_token_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)(?:-|\s+)miles?\b").expect("valid mile token pattern")
  })
}

/// `"6 mi steady"` — the abbreviated unit is only trusted at the very start
fn leading_mi_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*mi\b").expect("valid leading-mi pattern")
  })
}

fn leading_number_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)").expect("valid leading-number pattern"))
}

fn brick_run_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)(?:-|\s+)miles?\s+run|run\s+(?:of\s+)?(\d+(?:\.\d+)?)\s+miles?")
      .expect("valid brick run pattern")
  })
}

fn brick_bike_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"(?i)(\d+(?:\.\d+)?)(?:-|\s+)miles?\s+(?:bike|ride)|(?:bike|ride)\s+(?:of\s+)?(\d+(?:\.\d+)?)\s+miles?",
    )
    .expect("valid brick bike pattern")
  })
}

fn capture_miles(re: &Regex, text: &str) -> Option<f64> {
  let caps = re.captures(text)?;
  caps
    .iter()
    .skip(1)
    .flatten()
    .next()
    .and_then(|m| m.as_str().parse().ok())
}

/// ---------------------------------------------------------------------------
/// Distance Extraction
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
  Run,
  Bike,
  Elliptical,
  /// Already cross-modality normalized; added to the total with zero conversion
  RunEquivalent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtractedDistance {
  pub miles: f64,
  pub modality: Modality,
}

impl ExtractedDistance {
  fn run(miles: f64) -> Self {
    Self { miles, modality: Modality::Run }
  }
  fn bike(miles: f64) -> Self {
    Self { miles, modality: Modality::Bike }
  }
  fn elliptical(miles: f64) -> Self {
    Self { miles, modality: Modality::Elliptical }
  }
  fn run_equivalent(miles: f64) -> Self {
    Self { miles, modality: Modality::RunEquivalent }
  }
}

/// Modality of a workout independent of where its distance came from.
/// RunEQ labeling wins over generic bike/elliptical matching.
fn classify_modality(workout: &ResolvedWorkout) -> Modality {
  let lower = workout.name.to_lowercase();
  if runeq_re().is_match(&workout.name) {
    Modality::RunEquivalent
  } else if workout.workout_type == WorkoutType::Bike
    || lower.contains("bike")
    || lower.contains("cycling")
  {
    Modality::Bike
  } else if lower.contains("elliptical") || lower.contains("cyclete") {
    Modality::Elliptical
  } else {
    Modality::Run
  }
}

fn parse_brick(description: &str) -> Vec<ExtractedDistance> {
  let mut parts = Vec::new();
  if let Some(run) = capture_miles(brick_run_re(), description) {
    parts.push(ExtractedDistance::run(run));
  }
  if let Some(bike) = capture_miles(brick_bike_re(), description) {
    parts.push(ExtractedDistance::bike(bike));
  }
  parts
}

/// Extract the distance(s) of one resolved workout.
///
/// Priority cascade, first match wins:
/// 1. explicit positive `distance` field
/// 2. RunEQ label in the name (checked before bike/elliptical so a
///    RunEQ-labeled bike session is never double-converted)
/// 3. brick workouts: run and bike legs parsed independently from the
///    description (the only rule that can yield two entries)
/// 4. bike by name, leading number
/// 5. elliptical by name (including the Cyclete device), leading number
/// 6. run-mile token in the name
/// 7. default-miles-by-type table
pub fn extract_distance(workout: &ResolvedWorkout) -> Vec<ExtractedDistance> {
  if let Some(d) = workout.distance {
    if d > 0.0 {
      return vec![ExtractedDistance { miles: d, modality: classify_modality(workout) }];
    }
  }

  if let Some(miles) = capture_miles(runeq_re(), &workout.name) {
    return vec![ExtractedDistance::run_equivalent(miles)];
  }

  if workout.workout_type == WorkoutType::BrickLongRun {
    let parts = parse_brick(&workout.description);
    if !parts.is_empty() {
      return parts;
    }
  }

  let lower = workout.name.to_lowercase();
  if lower.contains("bike") || lower.contains("cycling") {
    if let Some(miles) = capture_miles(leading_number_re(), &workout.name) {
      return vec![ExtractedDistance::bike(miles)];
    }
  } else if lower.contains("elliptical") || lower.contains("cyclete") {
    if let Some(miles) = capture_miles(leading_number_re(), &workout.name) {
      return vec![ExtractedDistance::elliptical(miles)];
    }
  } else if let Some(miles) = capture_miles(mile_token_re(), &workout.name)
    .or_else(|| capture_miles(leading_mi_re(), &workout.name))
  {
    return vec![ExtractedDistance::run(miles)];
  }

  let fallback = workout.workout_type.default_miles();
  if fallback <= 0.0 {
    return Vec::new();
  }
  vec![ExtractedDistance { miles: fallback, modality: classify_modality(workout) }]
}

/// ---------------------------------------------------------------------------
/// Weekly Aggregation
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeekMileage {
  pub run_miles: f64,
  pub bike_miles: f64,
  pub elliptical_miles: f64,
  pub pre_equivalenced_miles: f64,
  pub equivalent_miles: f64,
  pub total_miles: f64,
}

fn round1(value: f64) -> f64 {
  (value * 10.0).round() / 10.0
}

/// Aggregate a resolved week. Sums stay unrounded until the very end;
/// rounding per workout would drift the totals. When the generator
/// supplied an authoritative weekly total, that value is displayed and
/// the breakdown is only a composition hint.
pub fn week_mileage(
  resolved: &[ResolvedWorkout],
  authoritative_total: Option<f64>,
) -> WeekMileage {
  let mut run = 0.0;
  let mut bike = 0.0;
  let mut elliptical = 0.0;
  let mut pre_equivalenced = 0.0;

  for workout in resolved {
    for extracted in extract_distance(workout) {
      match extracted.modality {
        Modality::Run => run += extracted.miles,
        Modality::Bike => bike += extracted.miles,
        Modality::Elliptical => elliptical += extracted.miles,
        Modality::RunEquivalent => pre_equivalenced += extracted.miles,
      }
    }
  }

  let equivalent = bike / BIKE_MILES_PER_RUN_MILE
    + elliptical / ELLIPTICAL_MILES_PER_RUN_MILE
    + pre_equivalenced;
  let total = authoritative_total.unwrap_or(run + equivalent);

  WeekMileage {
    run_miles: round1(run),
    bike_miles: round1(bike),
    elliptical_miles: round1(elliptical),
    pre_equivalenced_miles: round1(pre_equivalenced),
    equivalent_miles: round1(equivalent),
    total_miles: round1(total),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
