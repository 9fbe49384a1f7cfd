use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use reply_analytics::{export, MultiPeriodOrchestrator, MultiPeriodResult, OrchestratorConfig, ReportGenerator};
use reply_core::config::{AppConfig, ReportFormat};
use reply_core::source::SourceRegistry;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "reply_meter=info,reply_analytics=info,reply_sources=info,warn";

#[derive(Parser)]
#[command(
    name = "reply-meter",
    about = "Measure how quickly you reply across email, chat, and task sources",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/reply-meter/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the reference timezone (IANA name, e.g. Europe/Berlin)
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all sources and print the response report (default)
    Report {
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print the config file path
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Markdown,
    Text,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Markdown => ReportFormat::Markdown,
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) if path.exists() => AppConfig::load_from(path)?,
        Some(path) => {
            tracing::debug!("No config at {}, using defaults", path.display());
            AppConfig::default()
        }
        None => AppConfig::load()?,
    };

    if let Some(tz) = &cli.timezone {
        config.timezone = tz.clone();
    }

    match cli.command {
        Some(Commands::Config { action }) => {
            handle_config_command(action, &config, cli.config.as_deref())
        }
        Some(Commands::Report { format, output }) => {
            if let Some(format) = format {
                config.report.format = format.into();
            }
            if output.is_some() {
                config.report.output = output;
            }
            run_report(&config).await
        }
        None => run_report(&config).await,
    }
}

async fn run_report(config: &AppConfig) -> Result<()> {
    let orchestrator_config =
        OrchestratorConfig::from_app_config(config).context("Invalid configuration")?;

    let mut registry = SourceRegistry::new();
    reply_sources::register_all(&mut registry, config);
    if registry.is_empty() {
        tracing::warn!("No sources enabled; the report will be empty");
    }

    tracing::info!(
        "Loaded {} sources, timezone: {}, fetch timeout: {}s",
        registry.len(),
        config.timezone,
        config.fetch.timeout_secs,
    );

    let orchestrator = MultiPeriodOrchestrator::new(orchestrator_config);
    let result = orchestrator.run(&registry, Utc::now()).await;

    let rendered = render(&result, config.report.format)?;
    match &config.report.output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!("Report written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn render(result: &MultiPeriodResult, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Markdown => ReportGenerator::daily_report(result),
        ReportFormat::Text => ReportGenerator::text_summary(result),
        ReportFormat::Json => {
            let mut json = export::summary_json(result)?;
            json.push('\n');
            json
        }
    })
}

fn handle_config_command(
    action: Option<ConfigAction>,
    config: &AppConfig,
    config_path: Option<&Path>,
) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::default_path);

    match action {
        Some(ConfigAction::Show) | None => {
            print!("{}", toml::to_string_pretty(config)?);
            if let Err(e) = config.validate() {
                eprintln!("warning: {}", e);
            }
        }
        Some(ConfigAction::Init) => {
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save_to(&path)?;
                println!("Wrote default config to: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => println!("{}", path.display()),
    }
    Ok(())
}
