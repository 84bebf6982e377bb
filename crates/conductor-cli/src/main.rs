mod offline;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use conductor_core::{
    ChannelProgress, Config, ConfigLoader, ConfiguredRetriever, InMemoryVectorStore,
    LocalDocumentLoader, ReportSource, ResearchComponents, ResearchLog, ResearchOptions,
    Retrievers, SessionOptions, SessionOutcome, StaticPlanner, TelemetryOptions, init_telemetry,
    metrics, run_research_session_with_options,
};
use offline::{DocumentIndex, FileScraper};
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "conductor",
    version,
    about = "Research conductor over local documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a research session and print the assembled context.
    Run(RunArgs),
    /// Print the resolved configuration.
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Query to research.
    #[arg(long)]
    query: String,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report source (web, local, hybrid, documents, vector_store).
    #[arg(long, value_parser = parse_source)]
    source: Option<ReportSource>,

    /// Directory of local documents; overrides `research.doc_path`.
    #[arg(long)]
    doc_path: Option<PathBuf>,

    /// Sub-query to research; repeat for several. Defaults to the query alone.
    #[arg(long = "sub-query")]
    sub_queries: Vec<String>,

    /// Research only these sources instead of searching.
    #[arg(long = "source-url")]
    source_urls: Vec<String>,

    /// Search in addition to the given source URLs.
    #[arg(long, default_value_t = false)]
    complement: bool,

    /// Tool-call strategy override (disabled, fast, deep).
    #[arg(long)]
    mcp_strategy: Option<String>,

    /// Write JSONL research logs under this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Optional session ID.
    #[arg(long)]
    session: Option<String>,

    /// Emit the session outcome as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_source(value: &str) -> Result<ReportSource, String> {
    value.parse()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.command.config_path())?;

    init_telemetry(telemetry_options(&config))?;
    metrics::init_metrics_from_env("conductor-cli")?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => run_command(config, args).await?,
            Command::Config(_) => config_command(&config)?,
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

impl Command {
    fn config_path(&self) -> Option<PathBuf> {
        match self {
            Command::Run(args) => args.config.clone(),
            Command::Config(args) => args.config.clone(),
        }
    }
}

fn telemetry_options(config: &Config) -> TelemetryOptions {
    TelemetryOptions {
        env_filter: Some(config.logging.level.clone()),
        ..TelemetryOptions::default()
    }
}

async fn run_command(config: Config, args: RunArgs) -> Result<()> {
    let json = args.json;
    let outcome = execute_run(config, args).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.summary);
        for (idx, entry) in outcome.context.iter().enumerate() {
            println!("\n--- context {} ---\n{}", idx + 1, entry);
        }
    }
    Ok(())
}

fn config_command(config: &Config) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn execute_run(mut config: Config, args: RunArgs) -> Result<SessionOutcome> {
    if let Some(doc_path) = args.doc_path.clone() {
        config.research.doc_path = doc_path;
    }
    if let Some(log_dir) = args.log_dir.clone() {
        config.logging.log_dir = Some(log_dir);
    }

    info!(
        query = %args.query,
        source = %args.source.unwrap_or(config.research.report_source),
        "starting research session"
    );

    let (progress, mut receiver) = ChannelProgress::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            info!(kind = event.kind.as_str(), "{}", event.message);
        }
    });

    let components = build_components(&config, &args.sub_queries, progress);

    let mut research = ResearchOptions::new(&args.query);
    research.report_source = args.source;
    research.source_urls = args.source_urls;
    research.complement_source_urls = args.complement;
    research.mcp_strategy = args.mcp_strategy;

    let mut options = SessionOptions::new(components, config.research, research);
    if let Some(session_id) = args.session {
        options = options.with_session_id(session_id);
    }

    let outcome = run_research_session_with_options(options).await;
    // Sender side is gone once the session returns.
    let _ = printer.await;
    outcome
}

fn build_components(
    config: &Config,
    sub_queries: &[String],
    progress: ChannelProgress,
) -> ResearchComponents {
    let doc_path = config.research.doc_path.clone();
    let retrievers = Retrievers::new([ConfiguredRetriever::web(
        "local_index",
        Arc::new(DocumentIndex::new(doc_path.clone())),
    )]);

    let mut components = ResearchComponents::new(
        Arc::new(StaticPlanner::new(sub_queries.iter().cloned())),
        retrievers,
        Arc::new(FileScraper),
    )
    .with_document_loader(Arc::new(LocalDocumentLoader::new(doc_path)))
    .with_vector_store(Arc::new(InMemoryVectorStore::default()))
    .with_progress(Arc::new(progress));

    let log = config
        .logging
        .log_dir
        .clone()
        .map(ResearchLog::new)
        .or_else(ResearchLog::from_env);
    if let Some(log) = log {
        components = components.with_research_log(log);
    }
    components
}
