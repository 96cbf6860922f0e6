//! enhance node: re-render flagged pages and read them again.
//!
//! Runs only when classify flagged at least one page. Each worker opens its
//! own PDF handle for the re-render, and the enhance prompt carries the
//! current state as context so the model knows what the first pass saw.
//! Enhanced pages cannot request another enhancement — the response shape
//! has no `enhancements` field, making this a single remediation pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::HeraldError;
use crate::model::Stage;
use crate::parse::parse_response;
use crate::pipeline::{encode, render, worker_bound};
use crate::prompts;
use crate::state::{
    ClassificationState, Enhancements, WorkflowState, CLASSIFICATION_STATE, TEMP_DIR,
};
use crate::workflow::{WorkflowRuntime, SOURCE_PDF};

/// Response shape of one enhance vision call. No `enhancements` field:
/// a page is remediated at most once.
#[derive(Debug, Deserialize)]
pub struct EnhancedFindings {
    pub markings_found: Vec<String>,
    pub rationale: String,
}

pub async fn run(
    rt: Arc<WorkflowRuntime>,
    state: WorkflowState,
) -> Result<WorkflowState, HeraldError> {
    let mut classification: ClassificationState = state.require(CLASSIFICATION_STATE)?;
    let temp_dir: PathBuf = state.require(TEMP_DIR)?;

    let flagged = classification.enhance_pages();
    if flagged.is_empty() {
        return Ok(state);
    }

    let instructions = rt.prompts.instructions(Stage::Enhance).await?;
    let prompt = prompts::compose(Stage::Enhance, &instructions, Some(&classification))?;

    let pdf_path = temp_dir.join(SOURCE_PDF);
    let workers = worker_bound(flagged.len());
    info!(flagged = flagged.len(), workers, "enhance: re-reading pages");

    let jobs: Vec<(usize, usize, Enhancements)> = flagged
        .into_iter()
        .map(|idx| {
            let page = &classification.pages[idx];
            (idx, page.page_number, page.enhancements.unwrap_or_default())
        })
        .collect();

    let mut inflight = stream::iter(jobs)
        .map(|(idx, page_number, hints)| {
            let rt = Arc::clone(&rt);
            let prompt = prompt.clone();
            let pdf_path = pdf_path.clone();
            let temp_dir = temp_dir.clone();
            async move {
                enhance_page(&rt, &prompt, &pdf_path, &temp_dir, page_number, hints)
                    .await
                    .map(|(path, findings)| (idx, path, findings))
                    .map_err(|e| HeraldError::EnhanceFailed {
                        page: page_number,
                        source: Box::new(e),
                    })
            }
        })
        .buffer_unordered(workers);

    while let Some(result) = inflight.next().await {
        let (idx, image_path, findings) = result?;
        let page = &mut classification.pages[idx];
        page.image_path = image_path;
        page.markings_found = findings.markings_found;
        page.rationale = findings.rationale;
        page.enhancements = None;
    }

    state.with(CLASSIFICATION_STATE, &classification)
}

async fn enhance_page(
    rt: &WorkflowRuntime,
    prompt: &str,
    pdf_path: &Path,
    temp_dir: &Path,
    page_number: usize,
    hints: Enhancements,
) -> Result<(PathBuf, EnhancedFindings), HeraldError> {
    let image_path =
        render::render_enhanced_page(pdf_path, temp_dir, page_number, hints, &rt.config).await?;
    let image = encode::encode_page_file(&image_path).await?;
    let agent = rt.agents.agent()?;
    debug!(page = page_number, "enhance: vision call");
    let response = agent.vision(prompt, vec![image]).await?;
    let findings = parse_response::<EnhancedFindings>(&response)?;
    Ok((image_path, findings))
}
