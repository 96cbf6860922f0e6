//! The classification workflow: four nodes over a shared state bag.
//!
//! ```text
//! init ──▶ classify ──▶ (enhance?) ──▶ finalize
//!  │          │             │             │
//!  │          │             │             └─ single chat call: document verdict
//!  │          │             └─ re-render flagged pages, re-read them
//!  │          └─ per-page vision calls, bounded fan-out
//!  └─ download blob, rasterise all pages
//! ```
//!
//! The conditional hop is the only branching in the graph: classify hands
//! off to enhance exactly when some page carries enhancement hints,
//! otherwise straight to finalize. Nodes receive the runtime by `Arc` and
//! the state by value; a node that fails discards its partial work.

pub mod classify;
pub mod enhance;
pub mod finalize;
pub mod init;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::agent::AgentFactory;
use crate::blob::BlobStore;
use crate::config::ClassifierConfig;
use crate::error::HeraldError;
use crate::graph::{CompiledGraph, GraphError, NodeFuture, StateGraph};
use crate::model::Document;
use crate::prompts::PromptSource;
use crate::state::{ClassificationState, WorkflowState, CLASSIFICATION_STATE};

/// Node names used in the workflow graph.
pub const INIT: &str = "init";
pub const CLASSIFY: &str = "classify";
pub const ENHANCE: &str = "enhance";
pub const FINALIZE: &str = "finalize";

/// Name of the downloaded source PDF inside the request temp directory.
pub const SOURCE_PDF: &str = "source.pdf";

/// Document reader collaborator. Storage is owned elsewhere; the engine
/// only reads records and later advances their status.
#[async_trait]
pub trait Documents: Send + Sync {
    /// Fetch a document or fail with [`HeraldError::DocumentNotFound`].
    async fn find(&self, id: Uuid) -> Result<Document, HeraldError>;
}

/// Shared dependencies carried into every node. Read-only during execution.
pub struct WorkflowRuntime {
    pub documents: Arc<dyn Documents>,
    pub blobs: Arc<dyn BlobStore>,
    pub prompts: Arc<dyn PromptSource>,
    pub agents: Arc<dyn AgentFactory>,
    pub config: ClassifierConfig,
}

/// True when any page in the bag carries enhancement hints.
fn needs_enhance(state: &WorkflowState) -> bool {
    state
        .get::<ClassificationState>(CLASSIFICATION_STATE)
        .map(|s| s.needs_enhance())
        .unwrap_or(false)
}

/// Assemble and validate the classification graph.
pub fn build_graph(runtime: Arc<WorkflowRuntime>) -> Result<CompiledGraph, GraphError> {
    let rt_init = Arc::clone(&runtime);
    let rt_classify = Arc::clone(&runtime);
    let rt_enhance = Arc::clone(&runtime);
    let rt_finalize = runtime;

    StateGraph::new()
        .add_node(INIT, move |state| -> NodeFuture {
            let rt = Arc::clone(&rt_init);
            Box::pin(async move { init::run(rt, state).await })
        })
        .add_node(CLASSIFY, move |state| -> NodeFuture {
            let rt = Arc::clone(&rt_classify);
            Box::pin(async move { classify::run(rt, state).await })
        })
        .add_node(ENHANCE, move |state| -> NodeFuture {
            let rt = Arc::clone(&rt_enhance);
            Box::pin(async move { enhance::run(rt, state).await })
        })
        .add_node(FINALIZE, move |state| -> NodeFuture {
            let rt = Arc::clone(&rt_finalize);
            Box::pin(async move { finalize::run(rt, state).await })
        })
        .add_edge(INIT, CLASSIFY)
        .add_conditional_edge(CLASSIFY, ENHANCE, needs_enhance)
        .add_edge(CLASSIFY, FINALIZE)
        .add_edge(ENHANCE, FINALIZE)
        .set_entry(INIT)
        .set_exit(FINALIZE)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClassificationPage, Enhancements};
    use std::path::PathBuf;

    fn state_with_pages(flagged: bool) -> WorkflowState {
        let pages = vec![ClassificationPage {
            page_number: 1,
            image_path: PathBuf::from("/tmp/page-1.png"),
            markings_found: vec![],
            rationale: String::new(),
            enhancements: flagged.then(Enhancements::default),
        }];
        WorkflowState::new()
            .with(
                CLASSIFICATION_STATE,
                &ClassificationState {
                    pages,
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn enhance_guard_follows_page_flags() {
        assert!(needs_enhance(&state_with_pages(true)));
        assert!(!needs_enhance(&state_with_pages(false)));
        assert!(!needs_enhance(&WorkflowState::new()));
    }
}
