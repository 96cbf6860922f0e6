//! finalize node: synthesize the document-level classification.
//!
//! One chat call, no images. The model sees every page's findings at once
//! and returns the document verdict. The prompt contract forbids reporting
//! a level below any marking observed on a page; tests spot-check that
//! contract with crafted page findings.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::HeraldError;
use crate::model::{Confidence, Stage};
use crate::parse::parse_response;
use crate::prompts;
use crate::state::{ClassificationState, WorkflowState, CLASSIFICATION_STATE};
use crate::workflow::WorkflowRuntime;

/// Response shape of the finalize chat call.
#[derive(Debug, Deserialize)]
pub struct DocumentVerdict {
    pub classification: String,
    pub confidence: Confidence,
    pub rationale: String,
}

pub async fn run(
    rt: Arc<WorkflowRuntime>,
    state: WorkflowState,
) -> Result<WorkflowState, HeraldError> {
    let mut classification: ClassificationState = state.require(CLASSIFICATION_STATE)?;

    let verdict = synthesize(&rt, &classification)
        .await
        .map_err(|e| HeraldError::FinalizeFailed {
            source: Box::new(e),
        })?;

    info!(
        classification = %verdict.classification,
        confidence = %verdict.confidence,
        "finalize: document verdict"
    );

    classification.classification = verdict.classification;
    classification.confidence = Some(verdict.confidence);
    classification.rationale = verdict.rationale;

    state.with(CLASSIFICATION_STATE, &classification)
}

async fn synthesize(
    rt: &WorkflowRuntime,
    classification: &ClassificationState,
) -> Result<DocumentVerdict, HeraldError> {
    let instructions = rt.prompts.instructions(Stage::Finalize).await?;
    let prompt = prompts::compose(Stage::Finalize, &instructions, Some(classification))?;
    let agent = rt.agents.agent()?;
    let response = agent.chat(&prompt).await?;
    parse_response::<DocumentVerdict>(&response)
}
