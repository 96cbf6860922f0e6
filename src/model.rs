//! Domain model: documents, classification records, and prompt overrides.
//!
//! Statuses, confidence levels, and prompt stages are closed enums that
//! round-trip through their database TEXT representation via `as_str` /
//! `FromStr`. Free strings never leak into the type system: an unknown value
//! coming back from the database is a decode error, not a silently-accepted
//! state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HeraldError;

// ── Documents ────────────────────────────────────────────────────────────

/// Lifecycle status of a stored document.
///
/// Transitions are driven by the classification operations:
/// `Pending → Review` (Classify), `Review → Complete` (Validate/Update),
/// `Complete → Review` (re-Classify).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Review,
    Complete,
}

impl DocumentStatus {
    /// Database TEXT representation.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Review => "review",
            DocumentStatus::Complete => "complete",
        }
    }

    /// Whether moving from `self` to `next` is a defined transition.
    ///
    /// Re-classification of a validated document is allowed: `Complete`
    /// flows back to `Review` and the validation fields are cleared.
    pub fn can_transition(self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Review)
                | (DocumentStatus::Review, DocumentStatus::Complete)
                | (DocumentStatus::Complete, DocumentStatus::Review)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "review" => Ok(DocumentStatus::Review),
            "complete" => Ok(DocumentStatus::Complete),
            other => Err(HeraldError::Internal(format!(
                "unknown document status '{other}'"
            ))),
        }
    }
}

/// A stored document as the engine sees it. Storage is owned by an external
/// collaborator; the engine reads documents and advances their status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Opaque blob locator resolved by the blob store.
    pub storage_key: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub updated_at: DateTime<Utc>,
}

// ── Classifications ──────────────────────────────────────────────────────

/// Categorical model self-report of classification confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Database TEXT representation (matches the CHECK constraint).
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            other => Err(HeraldError::Internal(format!(
                "unknown confidence '{other}'"
            ))),
        }
    }
}

/// A persisted classification record, 1:1 with its document.
///
/// `markings_found` is sorted ascending and deduplicated before persistence.
/// `validated_by` and `validated_at` are both null until a reviewer signs
/// off; re-classification clears them again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Free-form marking string, e.g. `SECRET//NOFORN`.
    pub classification: String,
    pub confidence: Confidence,
    pub markings_found: Vec<String>,
    pub rationale: String,
    pub classified_at: DateTime<Utc>,
    pub model_name: String,
    pub provider_name: String,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

impl Classification {
    /// Invariant check: validation fields are both set or both null.
    pub fn validation_consistent(&self) -> bool {
        self.validated_by.is_some() == self.validated_at.is_some()
    }
}

// ── Prompt overrides ─────────────────────────────────────────────────────

/// Workflow stage whose instructions can be tuned through the prompts table.
///
/// `Finalize` exists so the finalize node can compose its prompt through the
/// same machinery, but it is not externally tunable: the prompts schema only
/// admits `classify` and `enhance`, and [`Stage::from_str`] mirrors that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Enhance,
    Finalize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Enhance => "enhance",
            Stage::Finalize => "finalize",
        }
    }

    /// Whether instructions for this stage may be overridden via the
    /// prompts table.
    pub fn overridable(self) -> bool {
        matches!(self, Stage::Classify | Stage::Enhance)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = HeraldError;

    /// Parses a stage name supplied by a caller. Only the tunable stages are
    /// accepted; everything else (including `finalize`) is [`HeraldError::InvalidStage`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classify" => Ok(Stage::Classify),
            "enhance" => Ok(Stage::Enhance),
            other => Err(HeraldError::InvalidStage {
                stage: other.to_string(),
            }),
        }
    }
}

/// A tunable instruction block for one workflow stage.
///
/// At most one override per stage is `active` at a time, enforced by a
/// partial unique index plus a transactional activation swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOverride {
    pub id: Uuid,
    pub name: String,
    pub stage: Stage,
    pub instructions: String,
    pub description: Option<String>,
    pub active: bool,
}
