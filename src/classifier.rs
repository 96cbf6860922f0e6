//! The classification entry points consumed by the HTTP layer.
//!
//! [`Classifier::classify`] is the orchestration seam: preflight the
//! document, stand up a request-scoped temp directory, run the workflow
//! graph, and persist the result in one database transaction. The temp
//! directory is owned by this function — it is removed on every exit path,
//! success, error, or cancellation, because the [`tempfile::TempDir`] guard
//! travels with the future.
//!
//! The validate/update/read operations are thin delegations to the store;
//! they exist here so the HTTP layer has a single collaborator to hold.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::HeraldError;
use crate::graph::CompiledGraph;
use crate::model::Classification;
use crate::state::{
    ClassificationState, WorkflowState, CLASSIFICATION_STATE, DOCUMENT_ID, TEMP_DIR,
};
use crate::store::{
    ClassificationDraft, ClassificationStore, ListQuery, UpdateRequest,
};
use crate::workflow::{build_graph, WorkflowRuntime};

pub struct Classifier {
    runtime: Arc<WorkflowRuntime>,
    graph: CompiledGraph,
    store: ClassificationStore,
}

impl Classifier {
    /// Assemble the workflow graph once and keep it for the life of the
    /// classifier.
    pub fn new(runtime: WorkflowRuntime, pool: PgPool) -> Result<Self, HeraldError> {
        let runtime = Arc::new(runtime);
        let graph = build_graph(Arc::clone(&runtime))?;
        Ok(Self {
            runtime,
            graph,
            store: ClassificationStore::new(pool),
        })
    }

    /// Classify a stored document and persist the result.
    ///
    /// On success the classification row is upserted (re-classification
    /// overwrites and clears validation) and the document lands in
    /// `review`. On any workflow error nothing is written and the
    /// document's status is untouched.
    pub async fn classify(&self, document_id: Uuid) -> Result<Classification, HeraldError> {
        self.runtime.documents.find(document_id).await?;

        let temp_dir = tempfile::Builder::new()
            .prefix("herald-classify-")
            .tempdir()
            .map_err(|e| HeraldError::Internal(format!("failed to create temp dir: {e}")))?;
        info!(%document_id, temp_dir = %temp_dir.path().display(), "classify: starting workflow");

        let initial = WorkflowState::new()
            .with(DOCUMENT_ID, &document_id)?
            .with(TEMP_DIR, &temp_dir.path().to_path_buf())?;

        let final_state = self.graph.run(initial).await?;
        let outcome: ClassificationState = final_state.require(CLASSIFICATION_STATE)?;
        let confidence = outcome.confidence.ok_or_else(|| {
            HeraldError::Internal("workflow finished without a confidence level".into())
        })?;

        let draft = ClassificationDraft {
            document_id,
            classification: outcome.classification.clone(),
            confidence,
            markings_found: outcome.all_markings(),
            rationale: outcome.rationale.clone(),
            model_name: self.runtime.config.agent.model_name.clone(),
            provider_name: self.runtime.config.agent.provider_name.clone(),
        };
        let record = self.store.persist(&draft).await?;

        if let Err(e) = temp_dir.close() {
            warn!("failed to remove classify temp dir: {e}");
        }
        Ok(record)
    }

    /// Sign off on a classification; the document becomes `complete`.
    pub async fn validate(
        &self,
        id: Uuid,
        validated_by: &str,
    ) -> Result<Classification, HeraldError> {
        self.store.validate(id, validated_by).await
    }

    /// Apply reviewer corrections; the document becomes `complete`.
    pub async fn update(
        &self,
        id: Uuid,
        request: &UpdateRequest,
    ) -> Result<Classification, HeraldError> {
        self.store.update(id, request).await
    }

    pub async fn find(&self, id: Uuid) -> Result<Classification, HeraldError> {
        self.store.find(id).await
    }

    pub async fn find_by_document(
        &self,
        document_id: Uuid,
    ) -> Result<Classification, HeraldError> {
        self.store.find_by_document(document_id).await
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Classification>, HeraldError> {
        self.store.list(query).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), HeraldError> {
        self.store.delete(id).await
    }
}
