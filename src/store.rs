//! SQLite-backed document store.
//!
//! The engine treats persistence as a generic document store: whole-plan
//! JSON documents plus sparse overlay rows keyed by the composite slot
//! key. Writes are idempotent and last-write-wins per key; there is no
//! conflict resolution beyond that.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;

use crate::models::overlay::{
  CompletionOverlay, CompletionRecord, ModifiedOverlay, OverlayKind, SlotKey,
};
use crate::models::plan::{DaySlot, Plan};

pub type DbPool = SqlitePool;

/// ---------------------------------------------------------------------------
/// Errors
/// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Stored document is unreadable: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Serialize for StoreError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Pool Initialization
/// ---------------------------------------------------------------------------

/// Open (creating if needed) the database file and run migrations
pub async fn init_pool(db_path: &Path) -> Result<DbPool, StoreError> {
  let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(&db_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  tracing::info!(path = %db_path.display(), "plan store ready");
  Ok(pool)
}

/// ---------------------------------------------------------------------------
/// Plan Store
/// ---------------------------------------------------------------------------

pub struct PlanStore {
  pool: DbPool,
}

impl PlanStore {
  pub fn new(pool: DbPool) -> Self {
    Self { pool }
  }

  pub async fn get_plan(&self, user_id: &str) -> Result<Option<Plan>, StoreError> {
    let row = sqlx::query("SELECT document FROM plans WHERE user_id = ?")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await?;

    match row {
      Some(row) => {
        let document: String = row.get("document");
        Ok(Some(serde_json::from_str(&document)?))
      }
      None => Ok(None),
    }
  }

  pub async fn save_plan(&self, user_id: &str, plan: &Plan) -> Result<(), StoreError> {
    let document = serde_json::to_string(plan)?;

    sqlx::query(
      r#"
      INSERT INTO plans (user_id, document, updated_at)
      VALUES (?1, ?2, ?3)
      ON CONFLICT(user_id) DO UPDATE SET
        document = excluded.document,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(user_id)
    .bind(&document)
    .bind(Utc::now().to_rfc3339())
    .execute(&self.pool)
    .await?;

    tracing::info!(user_id, total_weeks = plan.total_weeks, "saved plan document");
    Ok(())
  }

  /// Rows for one overlay layer. Entries whose slot key no longer parses
  /// are skipped rather than failing the whole load.
  async fn overlay_rows(
    &self,
    user_id: &str,
    kind: OverlayKind,
  ) -> Result<Vec<(SlotKey, String)>, StoreError> {
    let rows = sqlx::query(
      "SELECT slot_key, document FROM overlay_entries WHERE user_id = ?1 AND kind = ?2",
    )
    .bind(user_id)
    .bind(kind.to_string())
    .fetch_all(&self.pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
      let raw_key: String = row.get("slot_key");
      match raw_key.parse::<SlotKey>() {
        Ok(key) => entries.push((key, row.get("document"))),
        Err(e) => {
          tracing::warn!(user_id, key = %raw_key, error = %e, "skipping unreadable overlay key");
        }
      }
    }
    Ok(entries)
  }

  pub async fn get_modified_overlay(&self, user_id: &str) -> Result<ModifiedOverlay, StoreError> {
    let mut overlay = ModifiedOverlay::new();
    for (key, document) in self.overlay_rows(user_id, OverlayKind::Modified).await? {
      overlay.insert(key, serde_json::from_str::<DaySlot>(&document)?);
    }
    Ok(overlay)
  }

  pub async fn get_completion_overlay(
    &self,
    user_id: &str,
  ) -> Result<CompletionOverlay, StoreError> {
    let mut overlay = CompletionOverlay::new();
    for (key, document) in self.overlay_rows(user_id, OverlayKind::Completion).await? {
      overlay.insert(key, serde_json::from_str::<CompletionRecord>(&document)?);
    }
    Ok(overlay)
  }

  async fn upsert_overlay_entry(
    &self,
    user_id: &str,
    kind: OverlayKind,
    key: &SlotKey,
    document: String,
  ) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO overlay_entries (user_id, kind, slot_key, document, updated_at)
      VALUES (?1, ?2, ?3, ?4, ?5)
      ON CONFLICT(user_id, kind, slot_key) DO UPDATE SET
        document = excluded.document,
        updated_at = excluded.updated_at
      "#,
    )
    .bind(user_id)
    .bind(kind.to_string())
    .bind(key.storage_key())
    .bind(&document)
    .bind(Utc::now().to_rfc3339())
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  pub async fn set_modified_entry(
    &self,
    user_id: &str,
    key: &SlotKey,
    slot: &DaySlot,
  ) -> Result<(), StoreError> {
    let document = serde_json::to_string(slot)?;
    self
      .upsert_overlay_entry(user_id, OverlayKind::Modified, key, document)
      .await
  }

  pub async fn set_completion_entry(
    &self,
    user_id: &str,
    key: &SlotKey,
    record: &CompletionRecord,
  ) -> Result<(), StoreError> {
    let document = serde_json::to_string(record)?;
    self
      .upsert_overlay_entry(user_id, OverlayKind::Completion, key, document)
      .await
  }

  pub async fn remove_overlay_entry(
    &self,
    user_id: &str,
    kind: OverlayKind,
    key: &SlotKey,
  ) -> Result<(), StoreError> {
    sqlx::query(
      "DELETE FROM overlay_entries WHERE user_id = ?1 AND kind = ?2 AND slot_key = ?3",
    )
    .bind(user_id)
    .bind(kind.to_string())
    .bind(key.storage_key())
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// Rewrite one overlay layer in a single transaction. Used after slot
  /// compaction, where several keys shift at once and a partial write
  /// would leave a gap.
  pub async fn replace_overlays(
    &self,
    user_id: &str,
    modified: &ModifiedOverlay,
    completions: &CompletionOverlay,
  ) -> Result<(), StoreError> {
    let now = Utc::now().to_rfc3339();
    let mut tx = self.pool.begin().await?;

    sqlx::query("DELETE FROM overlay_entries WHERE user_id = ?1")
      .bind(user_id)
      .execute(&mut *tx)
      .await?;

    for (key, slot) in modified.iter() {
      sqlx::query(
        "INSERT INTO overlay_entries (user_id, kind, slot_key, document, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
      )
      .bind(user_id)
      .bind(OverlayKind::Modified.to_string())
      .bind(key.storage_key())
      .bind(serde_json::to_string(slot)?)
      .bind(&now)
      .execute(&mut *tx)
      .await?;
    }

    for (key, record) in completions.iter() {
      sqlx::query(
        "INSERT INTO overlay_entries (user_id, kind, slot_key, document, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
      )
      .bind(user_id)
      .bind(OverlayKind::Completion.to_string())
      .bind(key.storage_key())
      .bind(serde_json::to_string(record)?)
      .bind(&now)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
