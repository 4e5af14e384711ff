use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use release_confidence::analysis::{AnalysisRequest, AnalysisRetryLoop};
use release_confidence::config::Config;
use release_confidence::diff::{self, DiffFormatter, UnifiedDiffFormatter};
use release_confidence::keyring;
use release_confidence::llm::{ChatCompletionsClient, LlmAnalyzer};
use release_confidence::prompt::ReleasePromptTemplate;
use release_confidence::truncation::{TruncationLevel, TruncationMetadata, Truncator};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "release-confidence",
    about = "LLM release-confidence analysis with risk-aware diff truncation",
    version
)]
struct Cli {
    /// Config file (defaults to ~/.config/release-confidence/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON file with risk patterns, combined with the defaults per config
    #[arg(long, global = true)]
    risk_patterns: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask the model for a release-confidence assessment
    Analyze(AnalyzeArgs),
    /// Print the risk tier of each path
    Classify {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Show what a truncation level would cut, without calling the model
    Preview {
        /// JSON file with one comparison or an array of comparisons
        #[arg(long)]
        comparisons: PathBuf,
        /// moderate, aggressive, extreme or ultimate
        #[arg(long, default_value = "moderate")]
        level: TruncationLevel,
    },
    /// Store the LLM API key in the system keychain
    SetKey { key: String },
    /// Write the effective settings to the config file
    InitConfig {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// JSON file with one comparison or an array of comparisons
    #[arg(long)]
    comparisons: PathBuf,
    /// Release documentation
    #[arg(long)]
    docs: Option<PathBuf>,
    /// Authorized reviewer guidance
    #[arg(long)]
    guidance: Option<PathBuf>,
    /// QE testing summary
    #[arg(long)]
    qe_summary: Option<PathBuf>,
    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    run_id: Uuid,
    model: &'a str,
    response: &'a str,
    truncation: Option<&'a TruncationMetadata>,
    attempts: usize,
}

#[derive(Serialize)]
struct Preview<'a> {
    original_diff_chars: usize,
    truncated_diff_chars: usize,
    truncation: &'a TruncationMetadata,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("  Error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.verbose, config.log_level.as_deref());

    let result = match cli.command {
        Command::Analyze(args) => analyze(&config, cli.risk_patterns.as_deref(), args).await,
        Command::Classify { paths } => classify(&config, cli.risk_patterns.as_deref(), &paths),
        Command::Preview { comparisons, level } => {
            preview(&config, cli.risk_patterns.as_deref(), &comparisons, level)
        }
        Command::SetKey { key } => set_key(&key),
        Command::InitConfig { force } => init_config(&config, cli.config.as_deref(), force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, configured: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("release_confidence=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info")))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn analyze(config: &Config, risk_patterns: Option<&Path>, args: AnalyzeArgs) -> Result<()> {
    let request = AnalysisRequest {
        comparisons: diff::load_comparisons(&args.comparisons)?,
        documentation: read_optional(args.docs.as_deref())?,
        guidance: read_optional(args.guidance.as_deref())?,
        qe_testing_summary: read_optional(args.qe_summary.as_deref())?,
    };

    let api_key = config.api_key().context(
        "No API key configured. Set RELEASE_CONFIDENCE_API_KEY or run `release-confidence set-key <key>`",
    )?;
    let client = Arc::new(ChatCompletionsClient::new(&config.llm, api_key)?);
    let model = client.model().to_string();
    let truncator = Truncator::new(Arc::new(config.risk_classifier(risk_patterns)?));

    let outcome = AnalysisRetryLoop::new(
        client,
        Arc::new(ReleasePromptTemplate),
        Arc::new(UnifiedDiffFormatter),
        truncator,
    )
    .with_classifier(config.context_classifier())
    .run(&request)
    .await?;

    let report = Report {
        run_id: outcome.run_id,
        model: &model,
        response: &outcome.response,
        truncation: outcome.truncation.as_ref(),
        attempts: outcome.attempts,
    };
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;

    match args.output {
        Some(path) => {
            fs::write(&path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("  + Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn classify(config: &Config, risk_patterns: Option<&Path>, paths: &[String]) -> Result<()> {
    let classifier = config.risk_classifier(risk_patterns)?;
    for path in paths {
        println!("{:<8} {}", classifier.classify(path).label(), path);
    }
    Ok(())
}

fn preview(
    config: &Config,
    risk_patterns: Option<&Path>,
    comparisons: &Path,
    level: TruncationLevel,
) -> Result<()> {
    let comparisons = diff::load_comparisons(comparisons)?;
    let truncator = Truncator::new(Arc::new(config.risk_classifier(risk_patterns)?));
    let (truncated, metadata) = truncator.truncate_all(&comparisons, level);

    let formatter = UnifiedDiffFormatter;
    let preview = Preview {
        original_diff_chars: formatter.format(&comparisons).len(),
        truncated_diff_chars: formatter.format(&truncated).len(),
        truncation: &metadata,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&preview).context("Failed to serialize preview")?
    );
    Ok(())
}

fn set_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        anyhow::bail!("API key must not be empty");
    }
    keyring::set_api_key(key)
        .map_err(|e| anyhow::anyhow!("Failed to store API key in keychain: {}", e))?;
    eprintln!("  + API key saved to system keychain");
    Ok(())
}

fn init_config(config: &Config, path: Option<&Path>, force: bool) -> Result<()> {
    let written = config.init_file(path, force)?;
    eprintln!("  + Config written to {}", written.display());
    Ok(())
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => Ok(String::new()),
    }
}
