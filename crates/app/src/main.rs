use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use grounded_rag_core::{
    default_token_source, AnswerKind, AnswerModel, ChatSession, DiscoveryEngineClient,
    ExtractiveAnswerer, GcsObjectStore, GeminiModel, GroundedAgent, ImportOutcome, IndexTarget,
    IngestionPipeline, IngestionReport, Location, RagConfig, Retriever, SearchClient,
    StorageLayout, TokenSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "grounded-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Google Cloud project that owns the data store.
    #[arg(long, env = "PROJECT_ID")]
    project_id: String,

    /// Data store location: us, eu or global.
    #[arg(long, env = "LOCATION")]
    location: Location,

    /// Discovery Engine data store id.
    #[arg(long, env = "DATA_STORE_ID")]
    data_store_id: String,

    /// Bucket for raw documents and the metadata manifest.
    #[arg(long, env = "GCS_BUCKET_NAME")]
    bucket: String,

    /// Vertex AI region used for the answer model.
    #[arg(long, env = "VERTEX_AI_REGION", default_value = "us-central1")]
    vertex_region: String,

    /// Gemini model name.
    #[arg(long, env = "MODEL", default_value = "gemini-2.0-flash-lite")]
    model: String,

    /// Display name used in the chat banner.
    #[arg(long, env = "APP_NAME", default_value = "GenAI-RAG")]
    app_name: String,
}

#[derive(Subcommand)]
enum Command {
    /// Upload documents, publish the manifest and import it into the data store.
    Ingest {
        /// Folder with .pdf, .txt and .md files.
        #[arg(long, default_value = "data/raw")]
        input_dir: PathBuf,
        /// Folder for the local manifest copy and processed_data.json.
        #[arg(long, default_value = "data/processed")]
        output_dir: PathBuf,
        /// Also walk subfolders.
        #[arg(long, default_value_t = false)]
        recursive: bool,
        /// Maximum files staged at once.
        #[arg(long, default_value = "4")]
        concurrency: usize,
        /// Print the ingestion report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Ask questions answered only from the indexed documents.
    Chat {
        /// Answer with the top retrieved passage instead of calling Gemini.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let app_version = env!("CARGO_PKG_VERSION");

    let mut config = RagConfig::new(
        IndexTarget::new(&cli.project_id, cli.location, &cli.data_store_id),
        &cli.bucket,
    );
    config.model.name = cli.model.clone();
    config.model.vertex_region = cli.vertex_region.clone();
    if let Command::Ingest {
        input_dir,
        output_dir,
        recursive,
        concurrency,
        ..
    } = &cli.command
    {
        config.input_dir = input_dir.clone();
        config.output_dir = output_dir.clone();
        config.recursive = *recursive;
        config.upload_concurrency = *concurrency;
    }
    config.validate().context("invalid configuration")?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        project = %config.index.project_id,
        location = %config.index.location,
        data_store = %config.index.data_store_id,
        "grounded-rag boot"
    );

    let tokens = default_token_source()
        .await
        .context("no Google Cloud credentials available")?;
    let index = DiscoveryEngineClient::new(config.index.clone(), Arc::clone(&tokens));
    let client = SearchClient::connect(index, config.search)
        .await
        .context("data store validation failed")?;

    match cli.command {
        Command::Ingest { json, .. } => run_ingest(&config, client, tokens, json).await,
        Command::Chat { offline } => {
            if offline {
                run_chat(&cli.app_name, GroundedAgent::new(client, ExtractiveAnswerer)).await
            } else {
                let model = GeminiModel::new(&config.index.project_id, config.model.clone(), tokens);
                run_chat(&cli.app_name, GroundedAgent::new(client, model)).await
            }
        }
    }
}

async fn run_ingest(
    config: &RagConfig,
    client: SearchClient<DiscoveryEngineClient>,
    tokens: Arc<dyn TokenSource>,
    json: bool,
) -> anyhow::Result<()> {
    let store = GcsObjectStore::new(StorageLayout::new(config.bucket.clone()), tokens);
    let pipeline = IngestionPipeline::new(store, client, config)?;

    info!(input_dir = %config.input_dir.display(), "starting ingestion");
    let report = pipeline
        .ingest(&config.input_dir, &config.output_dir)
        .await
        .context("ingestion could not start")?;

    if json {
        println!("{}", report.to_json().context("could not render report")?);
    } else {
        print_summary(&report);
    }

    match &report.import {
        ImportOutcome::Failed { reason } => anyhow::bail!("index import failed: {reason}"),
        ImportOutcome::Completed(_) | ImportOutcome::Skipped => Ok(()),
    }
}

fn print_summary(report: &IngestionReport) {
    println!(
        "{} of {} documents staged, {} failed",
        report.staged.len(),
        report.discovered,
        report.failures.len()
    );
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.reason);
    }
    match &report.import {
        ImportOutcome::Completed(import) => println!(
            "import {}: {} succeeded, {} failed",
            import.operation, import.success_count, import.failure_count
        ),
        ImportOutcome::Failed { reason } => println!("import failed: {reason}"),
        ImportOutcome::Skipped => println!("import skipped: nothing to index"),
    }
    if let Some(path) = &report.processed_data {
        println!("processed data: {}", path.display());
    }
    println!("finished at {}", report.finished_at.to_rfc3339());
}

/// Log line for answers that degraded to a fixed message.
fn failure_note(kind: AnswerKind) -> Option<&'static str> {
    match kind {
        AnswerKind::Grounded | AnswerKind::Refused => None,
        AnswerKind::RetrievalFailed => Some("retrieval failed"),
        AnswerKind::ModelFailed => Some("answer model unavailable"),
    }
}

async fn run_chat<R, M>(app_name: &str, agent: GroundedAgent<R, M>) -> anyhow::Result<()>
where
    R: Retriever,
    M: AnswerModel,
{
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session = ChatSession::new(&agent);

    stdout
        .write_all(format!("--- {app_name} chatbot ---\nType 'exit' to quit.\n").as_bytes())
        .await?;

    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let answer = session.ask(question).await;
        if let Some(note) = failure_note(answer.kind) {
            warn!(kind = ?answer.kind, "{note}");
        }
        stdout
            .write_all(format!("Assistant: {}\n", answer.text).as_bytes())
            .await?;
    }

    info!(turns = session.history().len(), "chat session closed");
    Ok(())
}
