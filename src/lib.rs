//! # herald
//!
//! Classify U.S. security markings in stored PDF documents using Vision
//! Language Models, producing structured, human-validatable classification
//! records. Built for corpora approaching a million documents: one
//! classification request is one bounded, request-scoped pipeline, and
//! clients fan out across documents.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document (blob store)
//!  │
//!  ├─ init      download source.pdf, rasterise pages via pdfium (spawn_blocking)
//!  ├─ classify  per-page vision calls (bounded fan-out, no cross-page state)
//!  ├─ enhance?  re-render illegible pages (brightness/contrast/saturation), re-read
//!  ├─ finalize  one chat call: document-level marking + confidence
//!  └─ persist   upsert classification, document → review (one transaction)
//! ```
//!
//! The four stages run over a minimal state graph with a single conditional
//! edge: classify hands off to enhance exactly when a page carries
//! enhancement hints. Rendered images live in a `herald-classify-*` temp
//! directory that is removed on every exit path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use herald::{
//!     AgentConfig, Classifier, ClassifierConfig, DocumentStore, FsBlobStore,
//!     PromptStore, WorkflowRuntime,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = herald::store::connect("postgresql://localhost/herald").await?;
//! let config = ClassifierConfig::builder(AgentConfig::new("openai", "gpt-4.1-nano")).build()?;
//! let runtime = WorkflowRuntime {
//!     documents: Arc::new(DocumentStore::new(pool.clone())),
//!     blobs: Arc::new(FsBlobStore::new("/var/lib/herald/blobs")),
//!     prompts: Arc::new(PromptStore::new(pool.clone())),
//!     agents: Arc::new(config.agent.clone()),
//!     config,
//! };
//! let classifier = Classifier::new(runtime, pool)?;
//! let record = classifier.classify("7f8dc6e0-4d2f-4f6a-9c7b-2f64268e1a55".parse()?).await?;
//! println!("{} ({})", record.classification, record.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! The provider API token is read from the environment by the provider
//! layer (`OPENAI_API_KEY`, `AZURE_OPENAI_API_KEY`, …); it never appears in
//! configuration values.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod agent;
pub mod blob;
pub mod classifier;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod state;
pub mod store;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use agent::{Agent, AgentFactory};
pub use blob::{BlobStore, FsBlobStore, HttpBlobStore};
pub use classifier::Classifier;
pub use config::{AgentConfig, ClassifierConfig, ClassifierConfigBuilder};
pub use error::HeraldError;
pub use model::{Classification, Confidence, Document, DocumentStatus, PromptOverride, Stage};
pub use prompts::{DefaultPrompts, PromptSource};
pub use state::{ClassificationPage, ClassificationState, Enhancements, WorkflowState};
pub use store::{
    ClassificationStore, DocumentStore, ListQuery, PromptStore, UpdateRequest,
};
pub use workflow::{Documents, WorkflowRuntime};
