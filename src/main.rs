//! # Incident Digest CLI (`digest`)
//!
//! ```bash
//! digest --config ./config/digest.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `digest analyze` | Build (and persist) the report for one service/env/date |
//! | `digest show` | Print a previously persisted report |
//! | `digest sanitize` | Redact a file or stdin to stdout |
//!
//! Reports are printed as JSON on stdout; progress and logs go to stderr.
//! When no provider credential is configured, `analyze` falls back to the
//! persisted report for the date.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use incident_digest::cancel::CancelToken;
use incident_digest::config::{self, Config};
use incident_digest::models::AnalysisResult;
use incident_digest::pipeline::{self, AnalysisRequest, Analyzer};
use incident_digest::progress::ProgressMode;
use incident_digest::provider::OpenAiProvider;
use incident_digest::sanitize::sanitize;
use incident_digest::store;
use incident_digest::DigestError;

/// Incident Digest: turn a day of application logs into an incident report.
#[derive(Parser)]
#[command(name = "digest", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "./config/digest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one day of logs and persist the report.
    ///
    /// Reads `<logs-root>/<date>/*.log`, redacts sensitive data, summarizes
    /// the text chunk by chunk, merges the partials into one report and
    /// writes it to `<logs-root>/<date>/summary.json`.
    Analyze {
        /// Service name passed to the model as context.
        #[arg(long)]
        service: String,

        /// Environment name (e.g. `prod`, `staging`).
        #[arg(long = "env")]
        environment: String,

        /// Day to analyze (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Override `[logs].root` for this run.
        #[arg(long)]
        logs_root: Option<PathBuf>,

        /// Progress output on stderr. Defaults to human on a TTY, else off.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Read, sanitize and chunk only; print counts and skip the provider.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the persisted report for a day.
    Show {
        /// Day to show (YYYY-MM-DD).
        #[arg(long)]
        date: String,

        /// Override `[logs].root`.
        #[arg(long)]
        logs_root: Option<PathBuf>,
    },

    /// Redact emails, bearer tokens and IPv4 addresses from a file or stdin.
    Sanitize {
        /// Input file; reads stdin when omitted.
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Sanitize { path } = &cli.command {
        return run_sanitize(path.as_ref());
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            service,
            environment,
            date,
            logs_root,
            progress,
            dry_run,
        } => {
            let root = cfg.logs_root(logs_root.as_deref());
            if dry_run {
                return run_dry_run(&cfg, &root, &date).await;
            }
            let request = AnalysisRequest::new(service, environment, date).with_logs_root(root);
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            run_analyze(&cfg, request, mode).await?;
        }
        Commands::Show { date, logs_root } => {
            let root = cfg.logs_root(logs_root.as_deref());
            let result = store::load_fallback(&date, &root).await?;
            print_report(&result)?;
        }
        Commands::Sanitize { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

async fn run_analyze(cfg: &Config, request: AnalysisRequest, mode: ProgressMode) -> Result<()> {
    let provider = match OpenAiProvider::new(&cfg.provider) {
        Ok(provider) => provider,
        Err(DigestError::CredentialMissing) => return run_offline(&request).await,
        Err(e) => return Err(e.into()),
    };

    let analyzer = Analyzer::new(Arc::new(provider), cfg);
    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let reporter = mode.reporter();
    match analyzer.analyze(request, cancel, reporter.as_ref()).await {
        Ok(result) => print_report(&result),
        Err(e) if e.is_cancelled() => {
            eprintln!("analysis cancelled; nothing was saved");
            Ok(())
        }
        Err(e @ DigestError::NotFound { .. }) => {
            Err(anyhow::Error::new(e).context("check --date and --logs-root"))
        }
        Err(e) if e.is_retryable() => Err(anyhow::Error::new(e)
            .context("the provider could not be reached; nothing was saved, try again later")),
        Err(e) => Err(e.into()),
    }
}

/// No credential: serve the persisted report for the date if there is one.
async fn run_offline(request: &AnalysisRequest) -> Result<()> {
    request.validate()?;
    let root = request
        .logs_root
        .as_deref()
        .context("logs root must be resolved before analysis")?;

    eprintln!(
        "Warning: {}; showing the cached report instead",
        DigestError::CredentialMissing
    );
    match store::load(&request.date, root).await? {
        Some(result) => print_report(&result),
        None => Err(anyhow::Error::new(DigestError::NoCachedReport {
            date: request.date.clone(),
        })
        .context("no provider credential and no cached report to fall back on")),
    }
}

async fn run_dry_run(cfg: &Config, root: &std::path::Path, date: &str) -> Result<()> {
    let preview = pipeline::preview(root, date, cfg.chunking.max_chars).await?;
    println!("analyze {} (dry-run)", date);
    println!("  log files: {}", preview.files.len());
    println!("  lines: {}", preview.lines);
    println!("  sanitized chars: {}", preview.chars);
    println!(
        "  redactions: {} ({} emails, {} tokens, {} ips)",
        preview.redactions.total(),
        preview.redactions.emails,
        preview.redactions.tokens,
        preview.redactions.ips
    );
    println!("  chunks: {}", preview.chunks);
    Ok(())
}

fn run_sanitize(path: Option<&PathBuf>) -> Result<()> {
    let input = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    print!("{}", sanitize(&input));
    Ok(())
}

fn print_report(result: &AnalysisResult) -> Result<()> {
    println!("{}", result.to_json_pretty()?);
    Ok(())
}
