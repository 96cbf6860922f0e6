//! init node: download the source blob and rasterise every page.
//!
//! No LLM calls happen here. The node leaves behind a fully populated
//! request temp directory (`source.pdf`, `page-{N}.png` per page) and a
//! [`ClassificationState`] with one empty page entry per rendered page.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::HeraldError;
use crate::pipeline::render;
use crate::state::{
    ClassificationPage, ClassificationState, WorkflowState, CLASSIFICATION_STATE, DOCUMENT_ID,
    FILENAME, PAGE_COUNT, TEMP_DIR,
};
use crate::workflow::{WorkflowRuntime, SOURCE_PDF};

pub async fn run(
    rt: Arc<WorkflowRuntime>,
    state: WorkflowState,
) -> Result<WorkflowState, HeraldError> {
    let document_id: Uuid = state.require(DOCUMENT_ID)?;
    let temp_dir: PathBuf = state.require(TEMP_DIR)?;

    let document = rt.documents.find(document_id).await?;
    info!(
        %document_id,
        filename = %document.filename,
        "init: downloading source blob"
    );

    let pdf_path = temp_dir.join(SOURCE_PDF);
    download_source(&rt, &document.storage_key, &pdf_path).await?;

    let page_paths = render::render_all_pages(&pdf_path, &temp_dir, &rt.config).await?;
    debug!(pages = page_paths.len(), "init: rendered pages");

    let pages: Vec<ClassificationPage> = page_paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| ClassificationPage::new(i + 1, path))
        .collect();
    let page_count = pages.len();
    let classification = ClassificationState {
        pages,
        ..Default::default()
    };

    state
        .with(CLASSIFICATION_STATE, &classification)?
        .with(FILENAME, &document.filename)?
        .with(PAGE_COUNT, &page_count)
}

/// Stream the blob to `source.pdf`. The reader is dropped — and thereby
/// closed — on every path out of this function, success or error.
async fn download_source(
    rt: &WorkflowRuntime,
    storage_key: &str,
    pdf_path: &std::path::Path,
) -> Result<(), HeraldError> {
    let mut reader =
        rt.blobs
            .download(storage_key)
            .await
            .map_err(|e| HeraldError::RenderFailed {
                detail: format!("blob download: {e}"),
            })?;

    let mut file = tokio::fs::File::create(pdf_path)
        .await
        .map_err(|e| HeraldError::RenderFailed {
            detail: format!("failed to create '{}': {e}", pdf_path.display()),
        })?;

    let bytes = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| HeraldError::RenderFailed {
            detail: format!("failed to spool blob to '{}': {e}", pdf_path.display()),
        })?;
    file.flush().await.map_err(|e| HeraldError::RenderFailed {
        detail: format!("failed to flush '{}': {e}", pdf_path.display()),
    })?;

    debug!(bytes, path = %pdf_path.display(), "init: source blob spooled");
    Ok(())
}
