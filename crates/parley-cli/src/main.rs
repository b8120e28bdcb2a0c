//! Parley CLI: run the conversation server and inspect what it stored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use parley_core::config::ParleyConfig;
use parley_core::provider::LlmProvider;
use parley_core::store::{EventSink, InMemoryStore, SessionStore};
use parley_core::summarizer::{Summarizer, truncate_chars};
use parley_hub::api;
use parley_hub::gateway::Gateway;
use parley_hub::providers::OllamaProvider;
use parley_hub::store::SqliteStore;
use parley_hub::tools::default_registry;

// ─── CLI Definition ────────────────────────────────────────

/// Parley: streaming chat sessions over a local model
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/parley/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a daily rolling file in this directory instead of stdout
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Ollama base URL (overrides config)
        #[arg(long)]
        backend_url: Option<String>,

        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep sessions and events in memory only
        #[arg(long, conflicts_with = "db")]
        memory: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the logged events of a session
    Events {
        /// Session id
        session: String,

        /// Maximum number of events
        #[arg(short, long)]
        limit: Option<usize>,

        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List recent sessions of a user
    Sessions {
        /// User id
        user: String,

        /// Maximum number of sessions
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Generate and store the summary of a finished session
    Summarize {
        /// Session id
        session: String,

        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

// ─── Helpers ───────────────────────────────────────────────

fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,parley_core=debug,parley_hub=debug"));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "parley.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

fn config_path(cli_path: Option<&Path>) -> PathBuf {
    cli_path
        .map(Path::to_path_buf)
        .unwrap_or_else(ParleyConfig::default_path)
}

/// File, then environment. Flags are applied by each command.
fn load_config(cli_path: Option<&Path>) -> anyhow::Result<ParleyConfig> {
    let path = config_path(cli_path);
    let mut config = ParleyConfig::load(&path)?;
    config.apply_env()?;
    debug!(path = %path.display(), model = %config.backend.model, "Configuration loaded");
    Ok(config)
}

fn open_store(config: &ParleyConfig, db: Option<PathBuf>) -> anyhow::Result<Arc<SqliteStore>> {
    let path = db.unwrap_or_else(|| config.store.resolved_path());
    let store = SqliteStore::open(&path)?;
    Ok(Arc::new(store))
}

fn print_banner(config: &ParleyConfig, store: &str) {
    let version = env!("CARGO_PKG_VERSION");
    let endpoint = format!("{}:{}", config.server.host, config.server.port);
    println!();
    println!("  {} {}", "Parley".cyan().bold(), format!("v{}", version).dimmed());
    println!("  {} {}", "Model:".dimmed(), config.backend.model.cyan());
    println!("  {} {}", "Backend:".dimmed(), config.backend.url.cyan());
    println!("  {} {}", "Store:".dimmed(), store.cyan());
    println!(
        "  {} {}",
        "Endpoint:".dimmed(),
        format!("http://{}", endpoint).green().bold()
    );
    println!();
    println!("  {}", "Endpoints:".bold());
    println!("    {}  chat session", format!("WS   ws://{}/ws/session/{{id}}?user_id=", endpoint).cyan());
    println!("    {}  health check", "GET  /health".cyan());
    println!("    {}  session events", "GET  /session/{id}".cyan());
    println!("    {}  live sessions of a user", "GET  /sessions?user_id=".cyan());
    println!("    {}  runtime counters", "GET  /metrics".cyan());
    println!();
    println!("  {}", "Press Ctrl+C to stop.".dimmed());
    println!();
}

// ─── Main ──────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            host,
            port,
            model,
            backend_url,
            db,
            memory,
        } => {
            let mut config = load_config(config_file)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(model) = model {
                config.backend.model = model;
            }
            if let Some(url) = backend_url {
                config.backend.url = url;
            }
            if let Some(db) = db {
                config.store.path = Some(db);
            }
            config.validate()?;
            run_serve(config, memory).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => run_config_show(config_file)?,
            ConfigAction::Init { force } => run_config_init(config_file, force)?,
            ConfigAction::Path => println!("{}", config_path(config_file).display()),
        },

        Commands::Events { session, limit, db } => {
            let config = load_config(config_file)?;
            run_events(&config, db, &session, limit).await?;
        }

        Commands::Sessions { user, limit, db } => {
            let config = load_config(config_file)?;
            run_sessions(&config, db, &user, limit)?;
        }

        Commands::Summarize { session, db } => {
            let config = load_config(config_file)?;
            config.validate()?;
            run_summarize(&config, db, &session).await?;
        }
    }

    Ok(())
}

// ─── Commands ──────────────────────────────────────────────

async fn run_serve(config: ParleyConfig, memory: bool) -> anyhow::Result<()> {
    let provider: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(config.backend.clone())?);

    if memory {
        print_banner(&config, "in-memory");
        serve_with(Arc::new(InMemoryStore::new()), provider, &config).await
    } else {
        let path = config.store.resolved_path();
        let store = Arc::new(SqliteStore::open(&path)?);
        print_banner(&config, &path.display().to_string());
        serve_with(store, provider, &config).await
    }
}

async fn serve_with<S>(
    store: Arc<S>,
    provider: Arc<dyn LlmProvider>,
    config: &ParleyConfig,
) -> anyhow::Result<()>
where
    S: EventSink + SessionStore + 'static,
{
    let tools = default_registry();
    info!(tools = ?tools.names(), "Starting gateway");
    let gateway = Arc::new(Gateway::new(store, provider, tools, config));
    api::start_server(gateway, &config.server.host, config.server.port).await
}

fn run_config_show(config_file: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path(config_file);
    let config = load_config(config_file)?;

    println!();
    println!("  {}", "Parley Configuration".bold());
    println!("  {} {}", "File:".dimmed(), path.display());
    if !path.exists() {
        println!("  {}", "(file not found, showing defaults)".yellow());
    }
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    match config.validate() {
        Ok(()) => println!("  {}", "Configuration is valid.".green()),
        Err(e) => println!("  {} {}", "Invalid:".red().bold(), e),
    }
    Ok(())
}

fn run_config_init(config_file: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config_path(config_file);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    ParleyConfig::default().save(&path)?;
    println!("  {} {}", "Wrote".green(), path.display());
    Ok(())
}

async fn run_events(
    config: &ParleyConfig,
    db: Option<PathBuf>,
    session_id: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let store = open_store(config, db)?;
    let events = store.fetch_events(session_id, limit).await?;

    if events.is_empty() {
        println!("  {}", format!("No events for session {}", session_id).yellow());
        return Ok(());
    }

    for event in &events {
        println!(
            "{} {} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            format!("{:<14}", event.event_type.as_str()).cyan(),
            event.content
        );
    }
    println!();
    println!("  {} event(s)", events.len());
    Ok(())
}

fn run_sessions(
    config: &ParleyConfig,
    db: Option<PathBuf>,
    user_id: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let store = open_store(config, db)?;
    let sessions = store.list_sessions(user_id, limit)?;

    if sessions.is_empty() {
        println!("  {}", format!("No sessions for user {}", user_id).yellow());
        return Ok(());
    }

    for record in &sessions {
        let status = if record.end_time.is_some() {
            "ended".dimmed()
        } else {
            "open".green()
        };
        println!(
            "{} {} {:>4} msgs {:>6}s  {}",
            record.session_id.cyan(),
            status,
            record.message_count,
            record.duration_seconds,
            record
                .summary
                .as_deref()
                .map(|s| truncate_chars(s, 60))
                .unwrap_or("")
                .dimmed()
        );
    }
    Ok(())
}

async fn run_summarize(
    config: &ParleyConfig,
    db: Option<PathBuf>,
    session_id: &str,
) -> anyhow::Result<()> {
    let store = open_store(config, db)?;
    let provider: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(config.backend.clone())?);
    let summarizer = Summarizer::new(
        provider,
        store,
        Some(config.backend.model.clone()),
        config.summary.clone(),
    );

    match summarizer.summarize(session_id).await? {
        Some(summary) => {
            println!("  {}", "Summary".bold());
            println!("  {}", summary);
        }
        None => println!("  {}", "Nothing to summarize.".yellow()),
    }
    Ok(())
}
