//! Classification persistence: the upsert behind `Classify`, the guarded
//! `Validate`/`Update` transitions, and the straightforward read side.
//!
//! Every operation that touches both a classification and its document runs
//! in one transaction. The document-status guard is a `WHERE … AND status =
//! 'review'` clause checked by row count — zero rows means the document was
//! not awaiting review, the transaction rolls back, and the caller gets
//! [`HeraldError::InvalidStatus`].

use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::HeraldError;
use crate::model::{Classification, Confidence, DocumentStatus};

/// Input to the classification upsert. Markings must already be sorted and
/// deduplicated; validation fields are always reset by the upsert.
#[derive(Debug, Clone)]
pub struct ClassificationDraft {
    pub document_id: Uuid,
    pub classification: String,
    pub confidence: Confidence,
    pub markings_found: Vec<String>,
    pub rationale: String,
    pub model_name: String,
    pub provider_name: String,
}

/// Caller-supplied corrections applied by `Update`.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub classification: String,
    pub rationale: String,
    pub updated_by: String,
}

/// Filters and pagination for `List`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub confidence: Option<Confidence>,
    /// `Some(true)` → validated only; `Some(false)` → awaiting review only.
    pub validated: Option<bool>,
    /// 1-indexed page.
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone)]
pub struct ClassificationStore {
    pool: PgPool,
}

impl ClassificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert the classification for a document and move the document to
    /// `review`, atomically.
    ///
    /// On conflict every content field is overwritten, `classified_at` is
    /// refreshed, and `validated_by`/`validated_at` are nulled — a
    /// re-classified document always needs a fresh human pass.
    pub async fn persist(&self, draft: &ClassificationDraft) -> Result<Classification, HeraldError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO classifications \
                 (id, document_id, classification, confidence, markings_found, \
                  rationale, classified_at, model_name, provider_name, \
                  validated_by, validated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, now(), $7, $8, NULL, NULL) \
             ON CONFLICT (document_id) DO UPDATE SET \
                 classification = EXCLUDED.classification, \
                 confidence = EXCLUDED.confidence, \
                 markings_found = EXCLUDED.markings_found, \
                 rationale = EXCLUDED.rationale, \
                 classified_at = now(), \
                 model_name = EXCLUDED.model_name, \
                 provider_name = EXCLUDED.provider_name, \
                 validated_by = NULL, \
                 validated_at = NULL \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(draft.document_id)
        .bind(&draft.classification)
        .bind(draft.confidence.as_str())
        .bind(Json(&draft.markings_found))
        .bind(&draft.rationale)
        .bind(&draft.model_name)
        .bind(&draft.provider_name)
        .fetch_one(&mut *tx)
        .await?;
        let record = classification_from_row(&row)?;

        // Unconditional: classify always lands the document in review,
        // including a re-classified `complete` document.
        sqlx::query("UPDATE documents SET status = $2, updated_at = now() WHERE id = $1")
            .bind(draft.document_id)
            .bind(DocumentStatus::Review.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            document_id = %draft.document_id,
            classification = %record.classification,
            "classification persisted, document moved to review"
        );
        Ok(record)
    }

    /// Mark a classification as human-validated and complete the document.
    pub async fn validate(
        &self,
        id: Uuid,
        validated_by: &str,
    ) -> Result<Classification, HeraldError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE classifications \
             SET validated_by = $2, validated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(id)
        .bind(validated_by)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(HeraldError::NotFound)?;
        let record = classification_from_row(&row)?;

        complete_document(&mut tx, record.document_id).await?;

        tx.commit().await?;
        info!(%id, validated_by, "classification validated");
        Ok(record)
    }

    /// Apply reviewer corrections, marking the classification validated by
    /// the editor. Confidence and markings are preserved as the model
    /// reported them.
    pub async fn update(
        &self,
        id: Uuid,
        request: &UpdateRequest,
    ) -> Result<Classification, HeraldError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE classifications \
             SET classification = $2, rationale = $3, \
                 validated_by = $4, validated_at = now() \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(id)
        .bind(&request.classification)
        .bind(&request.rationale)
        .bind(&request.updated_by)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(HeraldError::NotFound)?;
        let record = classification_from_row(&row)?;

        complete_document(&mut tx, record.document_id).await?;

        tx.commit().await?;
        info!(%id, updated_by = %request.updated_by, "classification updated");
        Ok(record)
    }

    pub async fn find(&self, id: Uuid) -> Result<Classification, HeraldError> {
        let row = sqlx::query("SELECT * FROM classifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(HeraldError::NotFound)?;
        classification_from_row(&row)
    }

    pub async fn find_by_document(&self, document_id: Uuid) -> Result<Classification, HeraldError> {
        let row = sqlx::query("SELECT * FROM classifications WHERE document_id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(HeraldError::NotFound)?;
        classification_from_row(&row)
    }

    /// Newest-first page of classifications matching the filters.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Classification>, HeraldError> {
        let page = query.page.max(1);
        let per_page = query.per_page.clamp(1, 200);

        let mut builder =
            sqlx::QueryBuilder::<sqlx::Postgres>::new("SELECT * FROM classifications WHERE true");
        if let Some(confidence) = query.confidence {
            builder.push(" AND confidence = ");
            builder.push_bind(confidence.as_str());
        }
        match query.validated {
            Some(true) => {
                builder.push(" AND validated_by IS NOT NULL");
            }
            Some(false) => {
                builder.push(" AND validated_by IS NULL");
            }
            None => {}
        }
        builder.push(" ORDER BY classified_at DESC LIMIT ");
        builder.push_bind(per_page as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page - 1) * per_page) as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), page, "listed classifications");
        rows.iter().map(classification_from_row).collect()
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), HeraldError> {
        let affected = sqlx::query("DELETE FROM classifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(HeraldError::NotFound);
        }
        Ok(())
    }
}

/// Guarded document completion: only a document awaiting review can be
/// completed. Zero affected rows rolls the caller's transaction back.
async fn complete_document(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    document_id: Uuid,
) -> Result<(), HeraldError> {
    let affected = sqlx::query(
        "UPDATE documents SET status = $2, updated_at = now() \
         WHERE id = $1 AND status = $3",
    )
    .bind(document_id)
    .bind(DocumentStatus::Complete.as_str())
    .bind(DocumentStatus::Review.as_str())
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(HeraldError::InvalidStatus { document_id });
    }
    Ok(())
}

pub(crate) fn classification_from_row(row: &PgRow) -> Result<Classification, HeraldError> {
    Ok(Classification {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        classification: row.try_get("classification")?,
        confidence: row.try_get::<String, _>("confidence")?.parse()?,
        markings_found: row.try_get::<Json<Vec<String>>, _>("markings_found")?.0,
        rationale: row.try_get("rationale")?,
        classified_at: row.try_get("classified_at")?,
        model_name: row.try_get("model_name")?,
        provider_name: row.try_get("provider_name")?,
        validated_by: row.try_get("validated_by")?,
        validated_at: row.try_get("validated_at")?,
    })
}
