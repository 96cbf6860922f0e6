//! PostgreSQL persistence for documents, classifications, and prompt
//! overrides.
//!
//! Queries use runtime binding and explicit row mapping; enum columns
//! round-trip through their TEXT form via the model's `FromStr`/`as_str`
//! pair, so a bad value in the database surfaces as a decode error instead
//! of a phantom state. Embedded migrations run on connect and are
//! idempotent.

pub mod classifications;
pub mod documents;
pub mod prompts;

pub use classifications::{ClassificationDraft, ClassificationStore, ListQuery, UpdateRequest};
pub use documents::DocumentStore;
pub use prompts::PromptStore;

use sqlx::PgPool;
use tracing::info;

use crate::error::HeraldError;

/// Connect to PostgreSQL and run embedded migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, HeraldError> {
    let pool = PgPool::connect(database_url).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| HeraldError::Internal(format!("migration failure: {e}")))?;
    info!("database connected, migrations applied");
    Ok(pool)
}
