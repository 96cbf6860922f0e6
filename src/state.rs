//! Workflow state carried through the classification graph.
//!
//! [`WorkflowState`] is an opaque key→JSON bag with typed accessors. Writes
//! go through [`WorkflowState::with`], which returns a **new** state — nodes
//! never mutate the bag they received, so a failed node leaves the prior
//! state intact and the runner can discard partial updates wholesale.
//!
//! The domain payload inside the bag is [`ClassificationState`]: one entry
//! per rendered page plus the document-level verdict filled in by the
//! finalize node. Pages live only for the duration of one classification
//! request; their `image_path` points into the request temp directory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HeraldError;
use crate::model::Confidence;

// ── Well-known state keys ────────────────────────────────────────────────

/// UUID of the document being classified (set by the caller).
pub const DOCUMENT_ID: &str = "document_id";
/// Request-scoped temp directory holding `source.pdf` and rendered pages.
pub const TEMP_DIR: &str = "temp_dir";
/// The accumulated [`ClassificationState`] (set by the init node).
pub const CLASSIFICATION_STATE: &str = "classification_state";
/// Original filename of the document (set by the init node).
pub const FILENAME: &str = "filename";
/// Number of rendered pages (set by the init node).
pub const PAGE_COUNT: &str = "page_count";

// ── State bag ────────────────────────────────────────────────────────────

/// Immutable key→JSON state bag passed between graph nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    slots: BTreeMap<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new state with `value` serialized under `key`.
    /// The receiver is left untouched (value semantics).
    pub fn with<T: Serialize>(&self, key: &str, value: &T) -> Result<WorkflowState, HeraldError> {
        let json = serde_json::to_value(value).map_err(|e| {
            HeraldError::Internal(format!("state key '{key}' is not serializable: {e}"))
        })?;
        let mut next = self.clone();
        next.slots.insert(key.to_string(), json);
        Ok(next)
    }

    /// Typed read; `None` when the key is absent or holds a different shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.slots
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Typed read that treats absence or shape mismatch as an internal error.
    /// Nodes use this for keys an upstream node is contracted to have set.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, HeraldError> {
        let value = self
            .slots
            .get(key)
            .ok_or_else(|| HeraldError::Internal(format!("state key '{key}' is missing")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            HeraldError::Internal(format!("state key '{key}' has unexpected shape: {e}"))
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }
}

// ── Classification payload ───────────────────────────────────────────────

/// Per-page rendering parameters the classify stage may emit to request a
/// higher-fidelity re-render. A non-null value on a page means "re-render
/// needed"; the enhance node nulls it out once the page has been redone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enhancements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<i32>,
}

impl Enhancements {
    /// Brightness percentage, clamped to 80–200; omitted means neutral (100).
    pub fn brightness_pct(&self) -> i32 {
        self.brightness.unwrap_or(100).clamp(80, 200)
    }

    /// Contrast level, clamped to −50…50; omitted means neutral (0).
    pub fn contrast_level(&self) -> i32 {
        self.contrast.unwrap_or(0).clamp(-50, 50)
    }

    /// Saturation percentage, clamped to 80–200; omitted means neutral (100).
    pub fn saturation_pct(&self) -> i32 {
        self.saturation.unwrap_or(100).clamp(80, 200)
    }
}

/// Findings for a single rendered page. Workflow-only; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPage {
    /// 1-indexed page number.
    pub page_number: usize,
    /// Rendered PNG inside the request temp directory.
    pub image_path: PathBuf,
    #[serde(default)]
    pub markings_found: Vec<String>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancements: Option<Enhancements>,
}

impl ClassificationPage {
    pub fn new(page_number: usize, image_path: PathBuf) -> Self {
        Self {
            page_number,
            image_path,
            markings_found: Vec::new(),
            rationale: String::new(),
            enhancements: None,
        }
    }
}

/// Accumulated classification findings for one document.
///
/// The top-level fields stay empty until the finalize node synthesizes the
/// document verdict from the per-page findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationState {
    #[serde(default)]
    pub classification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub pages: Vec<ClassificationPage>,
}

impl ClassificationState {
    /// True when any page carries enhancement hints.
    pub fn needs_enhance(&self) -> bool {
        self.pages.iter().any(|p| p.enhancements.is_some())
    }

    /// Indices (into `pages`) of pages flagged for enhancement.
    pub fn enhance_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.enhancements.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// All markings observed across pages, sorted ascending, deduplicated.
    pub fn all_markings(&self) -> Vec<String> {
        let mut markings: Vec<String> = self
            .pages
            .iter()
            .flat_map(|p| p.markings_found.iter().cloned())
            .collect();
        markings.sort();
        markings.dedup();
        markings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_returns_new_state() {
        let state = WorkflowState::new();
        let next = state.with(FILENAME, &"report.pdf").unwrap();

        assert!(!state.contains(FILENAME));
        assert_eq!(next.get::<String>(FILENAME).unwrap(), "report.pdf");
    }

    #[test]
    fn require_reports_missing_and_mismatched_keys() {
        let state = WorkflowState::new()
            .with(PAGE_COUNT, &3usize)
            .unwrap();

        assert_eq!(state.require::<usize>(PAGE_COUNT).unwrap(), 3);
        assert!(state.require::<usize>(FILENAME).is_err());
        assert!(state.require::<Vec<String>>(PAGE_COUNT).is_err());
    }

    #[test]
    fn enhancement_defaults_are_neutral() {
        let e = Enhancements::default();
        assert_eq!(e.brightness_pct(), 100);
        assert_eq!(e.contrast_level(), 0);
        assert_eq!(e.saturation_pct(), 100);
    }

    #[test]
    fn enhancement_hints_are_clamped() {
        let e = Enhancements {
            brightness: Some(300),
            contrast: Some(-90),
            saturation: Some(10),
        };
        assert_eq!(e.brightness_pct(), 200);
        assert_eq!(e.contrast_level(), -50);
        assert_eq!(e.saturation_pct(), 80);
    }

    fn page(n: usize, markings: &[&str], enhance: bool) -> ClassificationPage {
        ClassificationPage {
            page_number: n,
            image_path: PathBuf::from(format!("/tmp/page-{n}.png")),
            markings_found: markings.iter().map(|s| s.to_string()).collect(),
            rationale: String::new(),
            enhancements: enhance.then(|| Enhancements {
                brightness: Some(130),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn needs_enhance_and_flagged_indices() {
        let mut state = ClassificationState {
            pages: vec![page(1, &[], false), page(2, &[], true), page(3, &[], true)],
            ..Default::default()
        };
        assert!(state.needs_enhance());
        assert_eq!(state.enhance_pages(), vec![1, 2]);

        for p in &mut state.pages {
            p.enhancements = None;
        }
        assert!(!state.needs_enhance());
        assert!(state.enhance_pages().is_empty());
    }

    #[test]
    fn all_markings_is_sorted_and_deduplicated() {
        let state = ClassificationState {
            pages: vec![
                page(1, &["SECRET//NOFORN", "SECRET"], false),
                page(2, &["SECRET"], false),
                page(3, &["CONFIDENTIAL"], false),
            ],
            ..Default::default()
        };
        assert_eq!(
            state.all_markings(),
            vec!["CONFIDENTIAL", "SECRET", "SECRET//NOFORN"]
        );
    }

    #[test]
    fn classification_state_round_trips_through_the_bag() {
        let payload = ClassificationState {
            pages: vec![page(1, &["SECRET"], false)],
            ..Default::default()
        };
        let state = WorkflowState::new()
            .with(CLASSIFICATION_STATE, &payload)
            .unwrap();
        let back: ClassificationState = state.require(CLASSIFICATION_STATE).unwrap();
        assert_eq!(back, payload);
    }
}
