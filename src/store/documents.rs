//! Document reader backed by the documents table.
//!
//! Document CRUD belongs to an external collaborator; the engine only reads
//! records here. Status advancement happens inside the classification
//! transactions so it can never drift from the classification row.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::HeraldError;
use crate::model::Document;
use crate::workflow::Documents;

#[derive(Clone)]
pub struct DocumentStore {
    pool: PgPool,
}

impl DocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Documents for DocumentStore {
    async fn find(&self, id: Uuid) -> Result<Document, HeraldError> {
        let row = sqlx::query(
            "SELECT id, storage_key, filename, status, updated_at \
             FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(HeraldError::DocumentNotFound { id })?;

        document_from_row(&row)
    }
}

pub(crate) fn document_from_row(row: &PgRow) -> Result<Document, HeraldError> {
    Ok(Document {
        id: row.try_get("id")?,
        storage_key: row.try_get("storage_key")?,
        filename: row.try_get("filename")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        updated_at: row.try_get("updated_at")?,
    })
}
