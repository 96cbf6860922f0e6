//! Prompt override storage and resolution.
//!
//! Instruction resolution is the hot path: the classify and enhance nodes
//! call it once per document. The invariant "at most one active override per
//! stage" is enforced twice — a partial unique index in the schema, and a
//! two-statement transactional swap in [`PromptStore::activate`] so a swap
//! can never trip the index.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::HeraldError;
use crate::model::{PromptOverride, Stage};
use crate::prompts::{default_instructions, PromptSource};

#[derive(Clone)]
pub struct PromptStore {
    pool: PgPool,
}

impl PromptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new (inactive) override. A name collision is
    /// [`HeraldError::Duplicate`].
    pub async fn create(
        &self,
        name: &str,
        stage: Stage,
        instructions: &str,
        description: Option<&str>,
    ) -> Result<PromptOverride, HeraldError> {
        if !stage.overridable() {
            return Err(HeraldError::InvalidStage {
                stage: stage.to_string(),
            });
        }

        let row = sqlx::query(
            "INSERT INTO prompts (id, name, stage, instructions, description, active) \
             VALUES ($1, $2, $3, $4, $5, false) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(stage.as_str())
        .bind(instructions)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_aware)?;

        info!(name, stage = %stage, "prompt override created");
        prompt_from_row(&row)
    }

    /// Make `name` the active override for its stage, deactivating the
    /// current one. The swap is transactional so the partial unique index
    /// never sees two active rows.
    pub async fn activate(&self, name: &str) -> Result<PromptOverride, HeraldError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM prompts WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(HeraldError::NotFound)?;
        let target = prompt_from_row(&row)?;

        sqlx::query("UPDATE prompts SET active = false WHERE stage = $1 AND active = true")
            .bind(target.stage.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE prompts SET active = true WHERE id = $1")
            .bind(target.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(name, stage = %target.stage, "prompt override activated");
        Ok(PromptOverride {
            active: true,
            ..target
        })
    }

    /// Deactivate an override by name; its stage falls back to the
    /// compiled-in default.
    pub async fn deactivate(&self, name: &str) -> Result<(), HeraldError> {
        let affected = sqlx::query("UPDATE prompts SET active = false WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(HeraldError::NotFound);
        }
        info!(name, "prompt override deactivated");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<PromptOverride>, HeraldError> {
        let rows = sqlx::query("SELECT * FROM prompts ORDER BY stage, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(prompt_from_row).collect()
    }
}

#[async_trait]
impl PromptSource for PromptStore {
    /// Active override for the stage, else the compiled-in default.
    /// Non-overridable stages skip the table entirely.
    async fn instructions(&self, stage: Stage) -> Result<String, HeraldError> {
        if !stage.overridable() {
            return Ok(default_instructions(stage).to_string());
        }

        let row = sqlx::query(
            "SELECT instructions FROM prompts WHERE stage = $1 AND active = true",
        )
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                debug!(stage = %stage, "using active prompt override");
                Ok(row.try_get("instructions")?)
            }
            None => Ok(default_instructions(stage).to_string()),
        }
    }
}

fn duplicate_aware(e: sqlx::Error) -> HeraldError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return HeraldError::Duplicate;
        }
    }
    HeraldError::Database(e)
}

fn prompt_from_row(row: &PgRow) -> Result<PromptOverride, HeraldError> {
    Ok(PromptOverride {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        stage: row.try_get::<String, _>("stage")?.parse()?,
        instructions: row.try_get("instructions")?,
        description: row.try_get("description")?,
        active: row.try_get("active")?,
    })
}
