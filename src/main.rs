use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_hypothesis_analysis::{
    analysis::{HypothesisRequest, Mode, Orchestrator},
    config::{Config, LogFormat},
    evidence::HttpEvidenceProvider,
    langbase::LangbaseClient,
    reasoning::LangbaseReasoner,
    server::{AppState, McpServer},
    store::{HypothesisStore, InMemoryHypothesisStore, SqliteHypothesisStore},
};

#[derive(Parser)]
#[command(name = "mcp-hypothesis-analysis", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,
    /// Run a single analysis and print the result as JSON
    Analyze {
        #[arg(long, value_enum, default_value_t = ModeArg::Analyze)]
        mode: ModeArg,
        #[arg(long)]
        hypothesis: Option<String>,
        #[arg(long)]
        idea: Option<String>,
        /// Structured context as a JSON object
        #[arg(long)]
        context_json: Option<String>,
        /// Keep results in memory instead of the configured database
        #[arg(long)]
        no_store: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Analyze,
    Refine,
    Generate,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Analyze => Mode::Analyze,
            ModeArg::Refine => Mode::Refine,
            ModeArg::Generate => Mode::Generate,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP Hypothesis Analysis Server starting..."
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Analyze {
            mode,
            hypothesis,
            idea,
            context_json,
            no_store,
        } => {
            let context = match context_json {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            let request = HypothesisRequest {
                mode: mode.into(),
                hypothesis,
                idea,
                context,
                hypothesis_id: None,
            };
            analyze(config, request, no_store).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn HypothesisStore> = Arc::new(open_store(&config).await?);
    let orchestrator = build_orchestrator(&config, Arc::clone(&store)).await?;

    let state = Arc::new(AppState::new(orchestrator, store));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn analyze(config: Config, request: HypothesisRequest, no_store: bool) -> anyhow::Result<()> {
    let store: Arc<dyn HypothesisStore> = if no_store {
        Arc::new(InMemoryHypothesisStore::new())
    } else {
        Arc::new(open_store(&config).await?)
    };
    let orchestrator = build_orchestrator(&config, Arc::clone(&store)).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with partial result");
            on_interrupt.cancel();
        }
    });

    let result = orchestrator.run_with_cancel(request, cancel).await;
    if let Err(e) = store.save_result(&result).await {
        warn!(run_id = %result.run_id, error = %e, "Failed to save analysis result");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteHypothesisStore> {
    match SqliteHypothesisStore::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            Ok(s)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            Err(e.into())
        }
    }
}

/// Build the Langbase client, make sure the pipes exist and wire the
/// orchestrator to the configured providers.
async fn build_orchestrator(
    config: &Config,
    store: Arc<dyn HypothesisStore>,
) -> anyhow::Result<Orchestrator> {
    let langbase = match LangbaseClient::new(&config.langbase, &config.request) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    // Ensure required pipes exist (create if needed)
    info!("Ensuring required Langbase pipes exist...");
    if let Err(e) = langbase.ensure_pipes(&config.pipes).await {
        error!(error = %e, "Failed to ensure pipes exist");
        return Err(e.into());
    }

    let evidence = HttpEvidenceProvider::new(&config.evidence, &config.request)?;
    info!(base_url = %config.evidence.base_url, "Evidence provider initialized");

    Ok(Orchestrator::from_config(
        config,
        Arc::new(LangbaseReasoner::new(langbase, config.pipes.clone())),
        Arc::new(evidence),
        store,
    ))
}

/// Initialize tracing/logging. `RUST_LOG` takes precedence over `LOG_LEVEL`.
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
