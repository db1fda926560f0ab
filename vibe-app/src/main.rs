use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vibe_common::observability::{LogConfig, LogFormat, init_logging};
use vibe_config::{LoggingConfig, VibeConfig, VibeConfigLoader, default_config_path};
use wiring::App;
mod wiring;

#[derive(Parser)]
#[command(name = "vibe", version, about = "CommunityVibe: community feedback ingestion and query API")]
struct Cli {
    /// Config file. Without it, the per-user config and then ./vibe.yaml are
    /// merged when present; `VIBE__` environment variables always win.
    #[arg(short, long, env = "VIBE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Default)]
enum Command {
    /// Run the scheduler and the query API (default).
    #[default]
    Serve,
    /// Run one ingestion cycle and print the reports.
    Ingest {
        /// Only this source id.
        #[arg(long)]
        source: Option<String>,
    },
    /// Run one LLM analysis batch.
    Analyze,
    /// Re-apply the configured keyword ruleset to every stored post.
    Recategorize,
    /// Print post counts as JSON.
    Stats,
}

fn load_config(path: Option<&PathBuf>) -> Result<VibeConfig> {
    let loader = match path {
        Some(path) => VibeConfigLoader::new().with_file(path),
        None => {
            let mut loader = VibeConfigLoader::new();
            if let Some(user) = default_config_path() {
                loader = loader.with_optional_file(user);
            }
            loader.with_optional_file("vibe.yaml")
        }
    };
    Ok(loader.load()?)
}

fn log_config(cfg: &LoggingConfig) -> Result<LogConfig> {
    Ok(LogConfig {
        app_name: cfg.app_name.clone(),
        log_dir: cfg.dir.clone(),
        emit_stderr: cfg.stderr,
        format: cfg.format.parse::<LogFormat>().map_err(|e| anyhow!(e))?,
        default_filter: cfg.filter.clone(),
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let cfg = load_config(cli.config.as_ref())?;
    let log_path = init_logging(log_config(&cfg.logging)?)?;
    tracing::info!(log = %log_path.display(), database = %cfg.database_url, "vibe.start");

    // 2) Wire actors, then run the requested command
    let app = App::build(cfg).await?;
    match cli.command.unwrap_or_default() {
        Command::Serve => return app.serve().await,
        Command::Ingest { source } => {
            let res = app.ingest_once(source.as_deref()).await;
            if res.is_err() {
                let known: Vec<_> = app.source_ids().collect();
                tracing::warn!(sources = ?known, "vibe.ingest.failed");
            }
            print_json(&res?)?;
        }
        Command::Analyze => print_json(&app.analyze_once().await?)?,
        Command::Recategorize => {
            let report = app.recategorize().await?;
            println!("{report}");
        }
        Command::Stats => print_json(&app.store().counts().await?)?,
    }
    app.shutdown().await
}
