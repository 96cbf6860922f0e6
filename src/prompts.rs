//! System prompts for the classification workflow.
//!
//! A stage's system prompt is built from three parts, in order, separated by
//! blank lines:
//!
//! 1. **Instructions** — tunable guidance. The active [`crate::model::PromptOverride`]
//!    for the stage wins; otherwise the compiled-in default below is used.
//! 2. **Specification** — immutable text pinning the JSON response shape.
//!    Never overridable: the workflow parser depends on it.
//! 3. **Running state** — optional labeled block holding the pretty-printed
//!    [`ClassificationState`]. Omitted when no state is passed.
//!
//! Centralising the text here keeps prompt changes reviewable in one place
//! and lets unit tests inspect composition without a live model.

use async_trait::async_trait;

use crate::error::HeraldError;
use crate::model::Stage;
use crate::state::ClassificationState;

// ── Default instructions (tunable via the prompts table) ─────────────────

pub const CLASSIFY_INSTRUCTIONS: &str = r#"You are an expert reviewer of U.S. classified document markings. You are shown one page of a document as an image. Identify every security marking visible on the page.

Follow these rules precisely:

1. BANNER LINES
   - Read the banner marking at the top and bottom of the page
   - Report the full banner string including all caveats, e.g. SECRET//NOFORN

2. PORTION MARKINGS
   - Report paragraph-level portion markings such as (S), (C), (U), (S//NF)
   - Expand portion abbreviations to their full form: (S) is SECRET,
     (C) is CONFIDENTIAL, (U) is UNCLASSIFIED, (S//NF) is SECRET//NOFORN

3. WHAT COUNTS
   - Classification levels: UNCLASSIFIED, CONFIDENTIAL, SECRET, TOP SECRET
   - Dissemination caveats appended with //, e.g. //NOFORN, //REL TO USA, FVEY
   - Report each distinct marking exactly once, verbatim and uppercase

4. LEGIBILITY
   - If a marking is too faint, washed out, or low-contrast to read with
     certainty, request a re-render by filling the enhancements object
   - Choose values that would make the suspect region readable: raise
     brightness for dark scans, raise contrast for faded stamps
   - If every marking is clearly legible, set enhancements to null"#;

pub const ENHANCE_INSTRUCTIONS: &str = r#"You are an expert reviewer of U.S. classified document markings. This page was re-rendered with adjusted brightness, contrast, or saturation because a marking was illegible on the first pass. Your earlier findings for the whole document are provided as context.

Re-read the page from scratch. Report every security marking you can now see — banner lines and portion markings — verbatim and uppercase. Do not copy the earlier findings; trust only what is visible in this image."#;

pub const FINALIZE_INSTRUCTIONS: &str = r#"You are an expert reviewer of U.S. classified document markings. You are given the per-page findings for an entire document. Determine the single document-level classification.

Follow these rules precisely:

1. The document classification is the HIGHEST marking observed on any page,
   with its caveats. Never report a level below a marking any page carries.
2. Keep dissemination caveats that apply at the chosen level, e.g. a document
   with SECRET//NOFORN on one page and SECRET elsewhere is SECRET//NOFORN.
3. Report HIGH confidence when the pages are consistent and legible, MEDIUM
   when markings conflict or a page was enhanced, LOW when findings are
   sparse or contradictory.
4. The rationale must cite the pages that drove the decision."#;

// ── Immutable response specifications ────────────────────────────────────

pub const CLASSIFY_SPEC: &str = r#"Respond with a single JSON object and nothing else:

{
  "markings_found": ["<marking>", ...],
  "rationale": "<why these markings were identified>",
  "enhancements": {"brightness": <80-200>, "contrast": <-50-50>, "saturation": <80-200>} or null
}

- markings_found is an array of strings; empty if no markings are visible
- enhancements must be null unless a re-render is genuinely needed
- omit enhancement fields you want left at their neutral value
- do not add commentary before or after the JSON"#;

pub const ENHANCE_SPEC: &str = r#"Respond with a single JSON object and nothing else:

{
  "markings_found": ["<marking>", ...],
  "rationale": "<why these markings were identified>"
}

- markings_found is an array of strings; empty if no markings are visible
- do not add commentary before or after the JSON"#;

pub const FINALIZE_SPEC: &str = r#"Respond with a single JSON object and nothing else:

{
  "classification": "<document-level marking>",
  "confidence": "HIGH" or "MEDIUM" or "LOW",
  "rationale": "<how the document level was derived from the pages>"
}

- classification must not be lower than any marking found on any page
- do not add commentary before or after the JSON"#;

/// Label preceding the serialized running state in a composed prompt.
const STATE_LABEL: &str = "Current classification state:";

// ── Composition ──────────────────────────────────────────────────────────

/// Compiled-in default instructions for a stage.
pub fn default_instructions(stage: Stage) -> &'static str {
    match stage {
        Stage::Classify => CLASSIFY_INSTRUCTIONS,
        Stage::Enhance => ENHANCE_INSTRUCTIONS,
        Stage::Finalize => FINALIZE_INSTRUCTIONS,
    }
}

/// The immutable response specification for a stage. Never overridable.
pub fn spec(stage: Stage) -> &'static str {
    match stage {
        Stage::Classify => CLASSIFY_SPEC,
        Stage::Enhance => ENHANCE_SPEC,
        Stage::Finalize => FINALIZE_SPEC,
    }
}

/// Assemble the system prompt for a stage: instructions, the immutable
/// spec, and (when given) the running state as a labeled JSON block.
pub fn compose(
    stage: Stage,
    instructions: &str,
    state: Option<&ClassificationState>,
) -> Result<String, HeraldError> {
    let mut prompt = format!("{}\n\n{}", instructions.trim_end(), spec(stage));
    if let Some(state) = state {
        let json = serde_json::to_string_pretty(state).map_err(|e| {
            HeraldError::Internal(format!("classification state is not serializable: {e}"))
        })?;
        prompt.push_str("\n\n");
        prompt.push_str(STATE_LABEL);
        prompt.push('\n');
        prompt.push_str(&json);
    }
    Ok(prompt)
}

// ── Instruction resolution ───────────────────────────────────────────────

/// Source of tunable stage instructions.
///
/// The database-backed implementation returns the active override for the
/// stage when one exists; [`DefaultPrompts`] always returns the compiled-in
/// text. Read-only and safe for concurrent use.
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn instructions(&self, stage: Stage) -> Result<String, HeraldError>;
}

/// Instruction source with no override table: compiled-in defaults only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

#[async_trait]
impl PromptSource for DefaultPrompts {
    async fn instructions(&self, stage: Stage) -> Result<String, HeraldError> {
        Ok(default_instructions(stage).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClassificationPage, ClassificationState};
    use std::path::PathBuf;

    #[test]
    fn compose_orders_instructions_spec_state() {
        let state = ClassificationState {
            pages: vec![ClassificationPage::new(1, PathBuf::from("/tmp/page-1.png"))],
            ..Default::default()
        };
        let prompt = compose(Stage::Enhance, "custom guidance", Some(&state)).unwrap();

        let instructions_at = prompt.find("custom guidance").unwrap();
        let spec_at = prompt.find(ENHANCE_SPEC).unwrap();
        let label_at = prompt.find("Current classification state:").unwrap();
        assert!(instructions_at < spec_at);
        assert!(spec_at < label_at);
        assert!(prompt.contains("\"page_number\": 1"));
    }

    #[test]
    fn compose_without_state_omits_the_block() {
        let prompt = compose(Stage::Classify, CLASSIFY_INSTRUCTIONS, None).unwrap();
        assert!(prompt.contains(CLASSIFY_SPEC));
        assert!(!prompt.contains("Current classification state:"));
    }

    #[test]
    fn parts_are_separated_by_blank_lines() {
        let prompt = compose(Stage::Classify, "do the thing", None).unwrap();
        assert!(prompt.starts_with("do the thing\n\n"));
    }

    #[test]
    fn override_text_replaces_instructions_not_spec() {
        let prompt = compose(Stage::Classify, "OVERRIDDEN", None).unwrap();
        assert!(prompt.contains("OVERRIDDEN"));
        assert!(!prompt.contains("BANNER LINES"));
        // The spec survives any override.
        assert!(prompt.contains("\"markings_found\""));
    }

    #[tokio::test]
    async fn default_source_returns_compiled_in_text() {
        let source = DefaultPrompts;
        for stage in [Stage::Classify, Stage::Enhance, Stage::Finalize] {
            assert_eq!(
                source.instructions(stage).await.unwrap(),
                default_instructions(stage)
            );
        }
    }

    #[test]
    fn enhance_spec_has_no_enhancement_field() {
        // Enhanced pages cannot re-request enhancement.
        assert!(!ENHANCE_SPEC.contains("enhancements"));
    }
}
