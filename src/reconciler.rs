//! Plan regeneration merge: splice freshly generated future weeks onto an
//! existing plan without ever altering or losing a completed week.
//!
//! Key principles:
//! - History is untouchable: weeks before the current week are copied
//!   verbatim, even if the generator returned content for them
//! - The generator is untrusted input; replacement shape is validated and
//!   a damaged preserved prefix is repaired or the merge fails closed
//! - A short replacement truncates `total_weeks`; weeks are never
//!   fabricated to pad the plan out

use serde::Serialize;
use thiserror::Error;

use crate::models::plan::{Plan, Week};

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The generator returned something unusable; the stored plan is unchanged
    #[error("Plan unchanged; replacement weeks rejected: {0}")]
    InvalidReplacement(String),

    /// A preserved week is damaged and could not be repaired from the live
    /// copy. Nothing was saved.
    #[error("Plan unchanged; cannot restore week {week}, corrupted backup - please regenerate from scratch")]
    CorruptedBackup { week: u32 },
}

impl Serialize for ReconcileError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// ---------------------------------------------------------------------------
/// Replacement Validation
/// ---------------------------------------------------------------------------

/// Shape-only validation of generator output: non-empty, and every week
/// carries workouts. Content is opaque to the engine.
pub fn validate_replacement(replacement: &[Week]) -> Result<(), ReconcileError> {
    if replacement.is_empty() {
        return Err(ReconcileError::InvalidReplacement(
            "generator returned no weeks".to_string(),
        ));
    }
    for (i, week) in replacement.iter().enumerate() {
        if week.is_malformed() {
            return Err(ReconcileError::InvalidReplacement(format!(
                "replacement week at position {} has no workouts",
                i
            )));
        }
    }
    Ok(())
}

/// ---------------------------------------------------------------------------
/// Merge
/// ---------------------------------------------------------------------------

/// Preserve completed/elapsed weeks and splice in the replacement.
///
/// `backup_weeks` is the snapshot being merged over; `live_weeks` is the
/// current in-memory copy, used to repair a damaged backup week before the
/// merge gives up and fails closed.
pub fn preserve_and_merge_weeks(
    backup_weeks: &[Week],
    live_weeks: &[Week],
    replacement: &[Week],
    current_week: u32,
) -> Result<Vec<Week>, ReconcileError> {
    validate_replacement(replacement)?;
    let current_week = current_week.max(1);

    let mut merged: Vec<Week> = Vec::with_capacity(
        (current_week as usize - 1) + replacement.len(),
    );

    for week_number in 1..current_week {
        let idx = week_number as usize - 1;
        let preserved = backup_weeks
            .get(idx)
            .filter(|w| !w.is_malformed())
            .or_else(|| live_weeks.get(idx).filter(|w| !w.is_malformed()));

        match preserved {
            Some(week) => {
                let mut week = week.clone();
                week.week_number = week_number;
                merged.push(week);
            }
            None => {
                tracing::warn!(week = week_number, "unrepairable week in preserved prefix");
                return Err(ReconcileError::CorruptedBackup { week: week_number });
            }
        }
    }

    for (i, week) in replacement.iter().enumerate() {
        let mut week = week.clone();
        week.week_number = current_week + i as u32;
        merged.push(week);
    }

    Ok(merged)
}

/// Merge a plan with newly generated weeks covering `current_week` onward.
///
/// The merged plan's `total_weeks` always equals its week count:
/// a replacement shorter than the existing tail truncates the plan, a
/// longer one extends it. Overlay layers are not touched; entries keyed
/// into the replaced range go stale and stop resolving.
pub fn merge_plans(
    existing: &Plan,
    replacement: &[Week],
    current_week: u32,
) -> Result<Plan, ReconcileError> {
    let merged = preserve_and_merge_weeks(
        &existing.weeks,
        &existing.weeks,
        replacement,
        current_week,
    )?;

    tracing::info!(
        preserved = current_week - 1,
        replaced = replacement.len(),
        total = merged.len(),
        "merged regenerated plan"
    );

    Ok(Plan {
        start_date: existing.start_date,
        total_weeks: merged.len() as u32,
        weeks: merged,
    })
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
