//! Error types for the herald classification engine.
//!
//! A single [`HeraldError`] enum covers every failure the engine can surface.
//! Workflow-stage failures ([`HeraldError::ClassifyFailed`],
//! [`HeraldError::EnhanceFailed`], [`HeraldError::FinalizeFailed`]) wrap the
//! underlying cause so callers and logs see both which stage died and why.
//! There are no retries at this layer: a failed workflow discards its partial
//! state, cleans up its temp directory, and leaves the database untouched.

use thiserror::Error;
use uuid::Uuid;

use crate::graph::GraphError;

/// All errors returned by the herald classification engine.
#[derive(Debug, Error)]
pub enum HeraldError {
    // ── Lookup errors ─────────────────────────────────────────────────────
    /// The document being classified does not exist.
    #[error("document {id} not found")]
    DocumentNotFound { id: Uuid },

    /// A classification (or prompt override) lookup matched no rows.
    #[error("record not found")]
    NotFound,

    // ── Workflow errors ───────────────────────────────────────────────────
    /// Blob download or page rasterisation failed during the init node.
    #[error("render failed: {detail}")]
    RenderFailed { detail: String },

    /// A page-level vision call failed during the classify node.
    /// Partial results from other pages are discarded.
    #[error("classification failed on page {page}")]
    ClassifyFailed {
        page: usize,
        #[source]
        source: Box<HeraldError>,
    },

    /// Re-render or re-classification of a flagged page failed.
    #[error("enhancement failed on page {page}")]
    EnhanceFailed {
        page: usize,
        #[source]
        source: Box<HeraldError>,
    },

    /// The document-level synthesis call failed.
    #[error("finalize failed")]
    FinalizeFailed {
        #[source]
        source: Box<HeraldError>,
    },

    /// The model response was not parseable as the expected JSON shape,
    /// even after code-fence extraction. The raw content is preserved so
    /// callers can log it.
    #[error("model response is not valid JSON ({} bytes)", .raw.len())]
    ParseFailed { raw: String },

    // ── Prompt errors ─────────────────────────────────────────────────────
    /// An unknown stage name was supplied where a tunable stage is expected.
    #[error("invalid prompt stage '{stage}': expected 'classify' or 'enhance'")]
    InvalidStage { stage: String },

    // ── Blob errors ───────────────────────────────────────────────────────
    /// The blob store has no object under the given key.
    #[error("blob '{key}' not found")]
    BlobNotFound { key: String },

    /// The blob store failed while opening or streaming an object.
    #[error("failed to download blob '{key}': {reason}")]
    BlobDownloadFailed { key: String, reason: String },

    // ── Agent errors ──────────────────────────────────────────────────────
    /// The configured LLM provider could not be constructed
    /// (missing API key, unknown provider name, …).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error; propagated verbatim, never retried.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// An insert violated a unique constraint.
    #[error("a record with that unique key already exists")]
    Duplicate,

    /// A guarded update matched no rows: the document is not awaiting review.
    #[error("document {document_id} is not in 'review' status")]
    InvalidStatus { document_id: Uuid },

    /// Any other database failure.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    // ── Graph errors ──────────────────────────────────────────────────────
    /// The workflow graph failed structural validation. This indicates a
    /// programming error in graph assembly, not bad input.
    #[error("workflow graph error")]
    Graph(#[from] GraphError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    /// True when the error should surface as a 404-style "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HeraldError::DocumentNotFound { .. }
                | HeraldError::NotFound
                | HeraldError::BlobNotFound { .. }
        )
    }

    /// True when the error is the caller's fault (400/409-style).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HeraldError::InvalidStage { .. }
                | HeraldError::Duplicate
                | HeraldError::InvalidStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failed_reports_length_not_content() {
        let err = HeraldError::ParseFailed {
            raw: "not json at all".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("15 bytes"));
        assert!(!msg.contains("not json"));
    }

    #[test]
    fn stage_errors_expose_their_cause() {
        use std::error::Error as _;
        let err = HeraldError::ClassifyFailed {
            page: 3,
            source: Box::new(HeraldError::LlmApiError {
                message: "rate limited".into(),
            }),
        };
        assert!(err.to_string().contains("page 3"));
        assert!(err.source().unwrap().to_string().contains("rate limited"));
    }

    #[test]
    fn error_classes() {
        assert!(HeraldError::NotFound.is_not_found());
        assert!(HeraldError::Duplicate.is_client_error());
        assert!(!HeraldError::Internal("x".into()).is_client_error());
    }
}
