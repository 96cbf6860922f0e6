//! Workflow node tests with scripted agents and in-memory collaborators.
//!
//! These tests are hermetic: no database, no pdfium, no live model. Page
//! images are tiny PNGs written to a temp directory, and the scripted agent
//! keys its responses off the base64 image payload it receives — which is
//! exactly what lets the ordering test verify that results land by page
//! number regardless of completion order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use herald::state::{CLASSIFICATION_STATE, DOCUMENT_ID, TEMP_DIR};
use herald::workflow::{classify, finalize, Documents, WorkflowRuntime};
use herald::{
    AgentConfig, AgentFactory, ClassificationPage, ClassificationState, ClassifierConfig,
    DefaultPrompts, Document, FsBlobStore, HeraldError, WorkflowState,
};

// ── Fakes ────────────────────────────────────────────────────────────────

struct FakeDocuments {
    documents: HashMap<Uuid, Document>,
}

#[async_trait]
impl Documents for FakeDocuments {
    async fn find(&self, id: Uuid) -> Result<Document, HeraldError> {
        self.documents
            .get(&id)
            .cloned()
            .ok_or(HeraldError::DocumentNotFound { id })
    }
}

/// Agent factory whose agents answer from a script.
///
/// Vision responses are keyed by the base64 image payload; a small delay
/// derived from the payload shuffles completion order across pages. Every
/// prompt seen is recorded for assertions.
#[derive(Default)]
struct ScriptedAgents {
    vision: HashMap<String, String>,
    chat: String,
    seen_vision_prompts: Arc<Mutex<Vec<String>>>,
    seen_chat_prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAgents {
    fn vision_prompts(&self) -> Vec<String> {
        self.seen_vision_prompts.lock().unwrap().clone()
    }

    fn chat_prompts(&self) -> Vec<String> {
        self.seen_chat_prompts.lock().unwrap().clone()
    }
}

struct ScriptedAgent {
    vision: HashMap<String, String>,
    chat: String,
    seen_vision_prompts: Arc<Mutex<Vec<String>>>,
    seen_chat_prompts: Arc<Mutex<Vec<String>>>,
}

impl AgentFactory for ScriptedAgents {
    fn agent(&self) -> Result<Box<dyn herald::Agent>, HeraldError> {
        Ok(Box::new(ScriptedAgent {
            vision: self.vision.clone(),
            chat: self.chat.clone(),
            seen_vision_prompts: Arc::clone(&self.seen_vision_prompts),
            seen_chat_prompts: Arc::clone(&self.seen_chat_prompts),
        }))
    }
}

#[async_trait]
impl herald::Agent for ScriptedAgent {
    async fn vision(
        &self,
        system_prompt: &str,
        images: Vec<edgequake_llm::ImageData>,
    ) -> Result<String, HeraldError> {
        self.seen_vision_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());

        let key = images[0].data.clone();
        let jitter = key.as_bytes().iter().map(|b| *b as u64).sum::<u64>() % 40;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        match self.vision.get(&key) {
            Some(response) => Ok(response.clone()),
            None => Err(HeraldError::LlmApiError {
                message: "unscripted image".into(),
            }),
        }
    }

    async fn chat(&self, prompt: &str) -> Result<String, HeraldError> {
        self.seen_chat_prompts
            .lock()
            .unwrap()
            .push(prompt.to_string());
        Ok(self.chat.clone())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Write a distinct tiny PNG per page and return (path, base64) pairs.
fn write_page_images(dir: &Path, count: usize) -> Vec<(PathBuf, String)> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use image::{DynamicImage, Rgba, RgbaImage};

    (1..=count)
        .map(|n| {
            let path = dir.join(format!("page-{n}.png"));
            let shade = (n * 13 % 255) as u8;
            let img =
                DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([shade, 0, 0, 255])));
            img.save(&path).unwrap();
            let b64 = STANDARD.encode(std::fs::read(&path).unwrap());
            (path, b64)
        })
        .collect()
}

fn runtime_with(agents: Arc<ScriptedAgents>, blob_root: &Path) -> Arc<WorkflowRuntime> {
    let config = ClassifierConfig::builder(AgentConfig::new("openai", "gpt-4.1-nano"))
        .build()
        .unwrap();
    Arc::new(WorkflowRuntime {
        documents: Arc::new(FakeDocuments {
            documents: HashMap::new(),
        }),
        blobs: Arc::new(FsBlobStore::new(blob_root)),
        prompts: Arc::new(DefaultPrompts),
        agents,
        config,
    })
}

fn state_with_pages(temp_dir: &Path, paths: &[(PathBuf, String)]) -> WorkflowState {
    let pages = paths
        .iter()
        .enumerate()
        .map(|(i, (path, _))| ClassificationPage::new(i + 1, path.clone()))
        .collect();
    WorkflowState::new()
        .with(DOCUMENT_ID, &Uuid::new_v4())
        .unwrap()
        .with(TEMP_DIR, &temp_dir.to_path_buf())
        .unwrap()
        .with(
            CLASSIFICATION_STATE,
            &ClassificationState {
                pages,
                ..Default::default()
            },
        )
        .unwrap()
}

fn findings_json(markings: &[&str]) -> String {
    serde_json::json!({
        "markings_found": markings,
        "rationale": format!("banner shows {}", markings.join(", ")),
        "enhancements": null,
    })
    .to_string()
}

// ── classify node ────────────────────────────────────────────────────────

#[tokio::test]
async fn classify_results_land_by_page_number_despite_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 8);

    let mut agents = ScriptedAgents::default();
    for (n, (_, b64)) in images.iter().enumerate() {
        agents
            .vision
            .insert(b64.clone(), findings_json(&[&format!("MARKING-{}", n + 1)]));
    }
    let agents = Arc::new(agents);
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let state = state_with_pages(dir.path(), &images);
    let out = classify::run(rt, state).await.unwrap();

    let classification: ClassificationState = out.require(CLASSIFICATION_STATE).unwrap();
    assert_eq!(classification.pages.len(), 8);
    for (i, page) in classification.pages.iter().enumerate() {
        assert_eq!(page.page_number, i + 1);
        assert_eq!(page.markings_found, vec![format!("MARKING-{}", i + 1)]);
        assert!(!page.rationale.is_empty());
    }
}

#[tokio::test]
async fn classify_prompt_is_composed_once_with_no_running_state() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 3);

    let mut agents = ScriptedAgents::default();
    for (_, b64) in &images {
        agents.vision.insert(b64.clone(), findings_json(&["SECRET"]));
    }
    let agents = Arc::new(agents);
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    classify::run(rt, state_with_pages(dir.path(), &images))
        .await
        .unwrap();

    let prompts = agents.vision_prompts();
    assert_eq!(prompts.len(), 3);
    // Pages are independent: every call got the identical prompt, and none
    // of them carried accumulated state.
    assert!(prompts.iter().all(|p| p == &prompts[0]));
    assert!(!prompts[0].contains("Current classification state:"));
}

#[tokio::test]
async fn classify_failure_cancels_and_discards_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 4);

    let mut agents = ScriptedAgents::default();
    // Page 3 is unscripted, so its call fails.
    for (n, (_, b64)) in images.iter().enumerate() {
        if n != 2 {
            agents.vision.insert(b64.clone(), findings_json(&["SECRET"]));
        }
    }
    let agents = Arc::new(agents);
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let err = classify::run(rt, state_with_pages(dir.path(), &images))
        .await
        .unwrap_err();
    match err {
        HeraldError::ClassifyFailed { page, .. } => assert_eq!(page, 3),
        other => panic!("expected ClassifyFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn classify_accepts_fenced_model_output() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 1);

    let mut agents = ScriptedAgents::default();
    agents.vision.insert(
        images[0].1.clone(),
        format!("```json\n{}\n```", findings_json(&["SECRET"])),
    );
    let rt = runtime_with(Arc::new(agents), dir.path());

    let out = classify::run(rt, state_with_pages(dir.path(), &images))
        .await
        .unwrap();
    let classification: ClassificationState = out.require(CLASSIFICATION_STATE).unwrap();
    assert_eq!(classification.pages[0].markings_found, vec!["SECRET"]);
}

#[tokio::test]
async fn classify_records_enhancement_flags() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 2);

    let mut agents = ScriptedAgents::default();
    agents.vision.insert(images[0].1.clone(), findings_json(&["SECRET"]));
    agents.vision.insert(
        images[1].1.clone(),
        serde_json::json!({
            "markings_found": [],
            "rationale": "stamp too faint to read",
            "enhancements": {"brightness": 130, "contrast": 20},
        })
        .to_string(),
    );
    let rt = runtime_with(Arc::new(agents), dir.path());

    let out = classify::run(rt, state_with_pages(dir.path(), &images))
        .await
        .unwrap();
    let classification: ClassificationState = out.require(CLASSIFICATION_STATE).unwrap();
    assert!(classification.needs_enhance());
    assert_eq!(classification.enhance_pages(), vec![1]);
    let hints = classification.pages[1].enhancements.unwrap();
    assert_eq!(hints.brightness, Some(130));
    assert_eq!(hints.contrast, Some(20));
    assert_eq!(hints.saturation, None);
}

#[tokio::test]
async fn classify_with_zero_pages_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let agents = Arc::new(ScriptedAgents::default());
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let state = state_with_pages(dir.path(), &[]);
    let out = classify::run(rt, state.clone()).await.unwrap();
    assert_eq!(out, state);
    assert!(agents.vision_prompts().is_empty());
}

// ── finalize node ────────────────────────────────────────────────────────

fn verdict_json(classification: &str, confidence: &str) -> String {
    serde_json::json!({
        "classification": classification,
        "confidence": confidence,
        "rationale": "highest marking across pages",
    })
    .to_string()
}

#[tokio::test]
async fn finalize_applies_the_document_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 2);

    let agents = Arc::new(ScriptedAgents {
        chat: verdict_json("SECRET//NOFORN", "HIGH"),
        ..Default::default()
    });
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let mut state = state_with_pages(dir.path(), &images);
    // Simulate classify having populated findings.
    let mut classification: ClassificationState = state.require(CLASSIFICATION_STATE).unwrap();
    classification.pages[0].markings_found = vec!["SECRET//NOFORN".into()];
    classification.pages[1].markings_found = vec!["SECRET".into()];
    state = state.with(CLASSIFICATION_STATE, &classification).unwrap();

    let out = finalize::run(rt, state).await.unwrap();
    let classification: ClassificationState = out.require(CLASSIFICATION_STATE).unwrap();
    assert_eq!(classification.classification, "SECRET//NOFORN");
    assert_eq!(classification.confidence, Some(herald::Confidence::High));
    assert!(!classification.rationale.is_empty());
}

#[tokio::test]
async fn finalize_prompt_carries_page_findings_and_the_no_downgrade_rule() {
    let dir = tempfile::tempdir().unwrap();
    let images = write_page_images(dir.path(), 2);

    let agents = Arc::new(ScriptedAgents {
        chat: verdict_json("SECRET//NOFORN", "HIGH"),
        ..Default::default()
    });
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let mut state = state_with_pages(dir.path(), &images);
    let mut classification: ClassificationState = state.require(CLASSIFICATION_STATE).unwrap();
    classification.pages[0].markings_found = vec!["SECRET//NOFORN".into()];
    classification.pages[1].markings_found = vec!["SECRET".into()];
    state = state.with(CLASSIFICATION_STATE, &classification).unwrap();

    finalize::run(rt, state).await.unwrap();

    let prompts = agents.chat_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("SECRET//NOFORN"));
    assert!(prompts[0].contains("Never report a level below"));
    assert!(prompts[0].contains("Current classification state:"));
}

#[tokio::test]
async fn finalize_wraps_bad_model_output() {
    let dir = tempfile::tempdir().unwrap();
    let agents = Arc::new(ScriptedAgents {
        chat: "the document looked secret-ish".into(),
        ..Default::default()
    });
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let err = finalize::run(rt, state_with_pages(dir.path(), &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, HeraldError::FinalizeFailed { .. }));
}

#[tokio::test]
async fn finalize_handles_an_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let agents = Arc::new(ScriptedAgents {
        chat: verdict_json("UNCLASSIFIED", "LOW"),
        ..Default::default()
    });
    let rt = runtime_with(Arc::clone(&agents), dir.path());

    let out = finalize::run(rt, state_with_pages(dir.path(), &[]))
        .await
        .unwrap();
    let classification: ClassificationState = out.require(CLASSIFICATION_STATE).unwrap();
    assert_eq!(classification.classification, "UNCLASSIFIED");
    assert!(classification.all_markings().is_empty());
}
