//! CLI binary for herald.
//!
//! A thin shim over the library crate: wires the store, blob store, and
//! agent config together from flags and environment, then calls the same
//! operations the HTTP layer consumes. Records are printed as pretty JSON
//! so output can be piped into jq.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use herald::store::{self, ListQuery, PromptStore, UpdateRequest};
use herald::{
    AgentConfig, Classifier, ClassifierConfig, Confidence, DocumentStore, FsBlobStore,
    HttpBlobStore, Stage, WorkflowRuntime,
};

#[derive(Parser)]
#[command(name = "herald", version, about = "Classify security markings in stored PDF documents")]
struct Cli {
    /// PostgreSQL connection string.
    #[arg(long, env = "HERALD_DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct AgentArgs {
    /// LLM provider name (openai, azure, anthropic, ollama, …).
    #[arg(long, env = "HERALD_PROVIDER", default_value = "openai")]
    provider: String,

    /// Vision-capable model identifier.
    #[arg(long, env = "HERALD_MODEL", default_value = "gpt-4.1-nano")]
    model: String,

    /// Rendering DPI for page rasterisation.
    #[arg(long, env = "HERALD_DPI", default_value_t = 300)]
    dpi: u32,
}

#[derive(Args)]
struct BlobArgs {
    /// Filesystem blob root (keys are relative paths).
    #[arg(long, env = "HERALD_BLOB_ROOT", conflicts_with = "blob_url")]
    blob_root: Option<String>,

    /// HTTP blob gateway base URL (keys are path segments).
    #[arg(long, env = "HERALD_BLOB_URL")]
    blob_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the classification workflow on a stored document.
    Classify {
        document_id: Uuid,
        #[command(flatten)]
        agent: AgentArgs,
        #[command(flatten)]
        blobs: BlobArgs,
    },
    /// Sign off on a classification; the document becomes complete.
    Validate {
        id: Uuid,
        /// Reviewer recorded as validated_by.
        #[arg(long)]
        by: String,
    },
    /// Correct a classification; the document becomes complete.
    Update {
        id: Uuid,
        #[arg(long)]
        classification: String,
        #[arg(long)]
        rationale: String,
        /// Editor recorded as validated_by.
        #[arg(long)]
        by: String,
    },
    /// Show one classification.
    Show { id: Uuid },
    /// List classifications, newest first.
    List {
        /// Filter by confidence (HIGH, MEDIUM, LOW).
        #[arg(long)]
        confidence: Option<String>,
        /// Only validated records.
        #[arg(long, conflicts_with = "pending")]
        validated: bool,
        /// Only records awaiting review.
        #[arg(long)]
        pending: bool,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        per_page: u32,
    },
    /// Delete a classification.
    Delete { id: Uuid },
    /// Manage tunable prompt instructions.
    #[command(subcommand)]
    Prompts(PromptCommand),
}

#[derive(Subcommand)]
enum PromptCommand {
    /// List all overrides.
    List,
    /// Create an inactive override for a stage (classify or enhance).
    Create {
        name: String,
        #[arg(long)]
        stage: String,
        /// Instructions text, or @path to read from a file.
        #[arg(long)]
        instructions: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Make an override the active one for its stage.
    Activate { name: String },
    /// Deactivate an override; its stage falls back to the default.
    Deactivate { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .context("set HERALD_DATABASE_URL or pass --database-url")?;
    let pool = store::connect(&database_url).await?;

    match cli.command {
        Command::Classify {
            document_id,
            agent,
            blobs,
        } => {
            let config = ClassifierConfig::builder(AgentConfig::new(agent.provider, agent.model))
                .dpi(agent.dpi)
                .build()?;
            let blob_store: Arc<dyn herald::BlobStore> = match (blobs.blob_root, blobs.blob_url) {
                (Some(root), _) => Arc::new(FsBlobStore::new(root)),
                (None, Some(url)) => Arc::new(HttpBlobStore::new(url.parse()?)?),
                (None, None) => anyhow::bail!("set HERALD_BLOB_ROOT or HERALD_BLOB_URL"),
            };
            let runtime = WorkflowRuntime {
                documents: Arc::new(DocumentStore::new(pool.clone())),
                blobs: blob_store,
                prompts: Arc::new(PromptStore::new(pool.clone())),
                agents: Arc::new(config.agent.clone()),
                config,
            };
            let classifier = Classifier::new(runtime, pool)?;
            print_json(&classifier.classify(document_id).await?)?;
        }
        Command::Validate { id, by } => {
            let store = herald::ClassificationStore::new(pool);
            print_json(&store.validate(id, &by).await?)?;
        }
        Command::Update {
            id,
            classification,
            rationale,
            by,
        } => {
            let store = herald::ClassificationStore::new(pool);
            let request = UpdateRequest {
                classification,
                rationale,
                updated_by: by,
            };
            print_json(&store.update(id, &request).await?)?;
        }
        Command::Show { id } => {
            let store = herald::ClassificationStore::new(pool);
            print_json(&store.find(id).await?)?;
        }
        Command::List {
            confidence,
            validated,
            pending,
            page,
            per_page,
        } => {
            let store = herald::ClassificationStore::new(pool);
            let query = ListQuery {
                confidence: confidence
                    .map(|c| c.parse::<Confidence>())
                    .transpose()?,
                validated: if validated {
                    Some(true)
                } else if pending {
                    Some(false)
                } else {
                    None
                },
                page,
                per_page,
            };
            print_json(&store.list(&query).await?)?;
        }
        Command::Delete { id } => {
            herald::ClassificationStore::new(pool).delete(id).await?;
            eprintln!("deleted {id}");
        }
        Command::Prompts(command) => {
            let prompts = PromptStore::new(pool);
            match command {
                PromptCommand::List => print_json(&prompts.list().await?)?,
                PromptCommand::Create {
                    name,
                    stage,
                    instructions,
                    description,
                } => {
                    let stage: Stage = stage.parse()?;
                    let instructions = match instructions.strip_prefix('@') {
                        Some(path) => std::fs::read_to_string(path)
                            .with_context(|| format!("reading instructions from '{path}'"))?,
                        None => instructions,
                    };
                    print_json(
                        &prompts
                            .create(&name, stage, &instructions, description.as_deref())
                            .await?,
                    )?;
                }
                PromptCommand::Activate { name } => print_json(&prompts.activate(&name).await?)?,
                PromptCommand::Deactivate { name } => {
                    prompts.deactivate(&name).await?;
                    eprintln!("deactivated '{name}'");
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
