//! classify node: per-page vision inference over the rendered pages.
//!
//! Pages are independent — the prompt carries **no running state**, so the
//! calls parallelize freely and later pages see no bias from earlier ones.
//! Cross-page synthesis is finalize's job. The prompt is composed once,
//! before the fan-out, so the active instructions are read from the prompt
//! source exactly once per document.

use std::path::Path;
use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::HeraldError;
use crate::model::Stage;
use crate::parse::parse_response;
use crate::pipeline::{encode, worker_bound};
use crate::prompts;
use crate::state::{ClassificationState, Enhancements, WorkflowState, CLASSIFICATION_STATE};
use crate::workflow::WorkflowRuntime;

/// Response shape of one classify vision call.
#[derive(Debug, Deserialize)]
pub struct PageFindings {
    pub markings_found: Vec<String>,
    pub rationale: String,
    #[serde(default)]
    pub enhancements: Option<Enhancements>,
}

pub async fn run(
    rt: Arc<WorkflowRuntime>,
    state: WorkflowState,
) -> Result<WorkflowState, HeraldError> {
    let mut classification: ClassificationState = state.require(CLASSIFICATION_STATE)?;
    if classification.pages.is_empty() {
        info!("classify: no pages to read");
        return Ok(state);
    }

    let instructions = rt.prompts.instructions(Stage::Classify).await?;
    let prompt = prompts::compose(Stage::Classify, &instructions, None)?;

    let workers = worker_bound(classification.pages.len());
    info!(
        pages = classification.pages.len(),
        workers, "classify: reading pages"
    );

    let jobs: Vec<(usize, std::path::PathBuf)> = classification
        .pages
        .iter()
        .map(|p| (p.page_number, p.image_path.clone()))
        .collect();

    // Results land in a slot pre-allocated per page, keyed by page number,
    // so the final ordering is deterministic regardless of completion order.
    let mut findings: Vec<Option<PageFindings>> = Vec::new();
    findings.resize_with(classification.pages.len(), || None);

    let mut inflight = stream::iter(jobs)
        .map(|(page_number, path)| {
            let rt = Arc::clone(&rt);
            let prompt = prompt.clone();
            async move {
                classify_page(&rt, &prompt, page_number, &path)
                    .await
                    .map(|f| (page_number, f))
                    .map_err(|e| HeraldError::ClassifyFailed {
                        page: page_number,
                        source: Box::new(e),
                    })
            }
        })
        .buffer_unordered(workers);

    while let Some(result) = inflight.next().await {
        // The `?` drops the stream, cancelling the in-flight calls, and
        // discards every partial result with the state bag unchanged.
        let (page_number, page_findings) = result?;
        findings[page_number - 1] = Some(page_findings);
    }

    for (page, found) in classification.pages.iter_mut().zip(findings) {
        let found = found.ok_or_else(|| {
            HeraldError::Internal(format!("page {} produced no findings", page.page_number))
        })?;
        page.markings_found = found.markings_found;
        page.rationale = found.rationale;
        page.enhancements = found.enhancements;
    }

    if classification.needs_enhance() {
        info!(
            flagged = classification.enhance_pages().len(),
            "classify: pages flagged for enhancement"
        );
    }

    state.with(CLASSIFICATION_STATE, &classification)
}

async fn classify_page(
    rt: &WorkflowRuntime,
    prompt: &str,
    page_number: usize,
    image_path: &Path,
) -> Result<PageFindings, HeraldError> {
    let image = encode::encode_page_file(image_path).await?;
    // Fresh agent per page task; transports are never shared across tasks.
    let agent = rt.agents.agent()?;
    debug!(page = page_number, "classify: vision call");
    let response = agent.vision(prompt, vec![image]).await?;
    parse_response::<PageFindings>(&response)
}
