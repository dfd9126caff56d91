//! CaseCraft command-line entry point.

use casecraft::config::CasecraftConfig;
use casecraft::engine::{GenerationEngine, RunOptions};
use casecraft::error::GeneratorError;
use casecraft_shared::types::api::{EndpointFilter, HttpMethod};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "casecraft",
    version,
    about = "Generate structured API test cases from OpenAPI/Swagger specs via multiple LLM providers"
)]
struct Cli {
    /// URL or local path of the OpenAPI 3.0 / Swagger 2.0 document
    source: String,

    /// Configuration file (defaults to casecraft.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only include endpoints carrying this tag (repeatable)
    #[arg(long = "include-tag")]
    include_tags: Vec<String>,

    /// Exclude endpoints carrying this tag (repeatable)
    #[arg(long = "exclude-tag")]
    exclude_tags: Vec<String>,

    /// Only include paths matching this glob pattern (repeatable)
    #[arg(long = "include-path")]
    include_paths: Vec<String>,

    /// Exclude paths matching this glob pattern (repeatable)
    #[arg(long = "exclude-path")]
    exclude_paths: Vec<String>,

    /// Only include these HTTP methods (repeatable)
    #[arg(long = "method")]
    methods: Vec<String>,

    /// Exclude these HTTP methods (repeatable)
    #[arg(long = "exclude-method")]
    exclude_methods: Vec<String>,

    /// Comma-separated active provider list (overrides config)
    #[arg(long)]
    providers: Option<String>,

    /// Assignment strategy: round_robin, random, complexity, manual
    #[arg(long)]
    strategy: Option<String>,

    /// Comma-separated fallback chain (overrides config)
    #[arg(long)]
    fallback: Option<String>,

    /// Manual strategy mapping, e.g. "GET /users/*:qwen,*:glm"
    #[arg(long = "map")]
    manual_mapping: Option<String>,

    /// Seed for the random strategy
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for test-case files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Nest artifacts under per-tag directories
    #[arg(long)]
    organize_by_tag: bool,

    /// State file path
    #[arg(long)]
    state: Option<PathBuf>,

    /// Regenerate all endpoints, ignoring stored fingerprints
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "casecraft=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let filter = match build_filter(&cli) {
        Ok(filter) => filter,
        Err(message) => {
            error!("{}", message);
            return 1;
        }
    };

    let mut config = match CasecraftConfig::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };
    apply_cli_overrides(&mut config, &cli);

    // Ctrl-C flips the cancellation token; every suspension point in
    // the scheduler observes it.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling in-flight jobs");
            signal_cancel.cancel();
        }
    });

    let engine = match GenerationEngine::new(config, cancel) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let options = RunOptions {
        source: cli.source.clone(),
        filter,
        force: cli.force,
    };

    match engine.run(options).await {
        Ok(summary) => {
            let code = summary.exit_code();
            if code == 0 {
                info!(
                    "Done: {} generated, {} skipped",
                    summary.generated, summary.skipped
                );
            }
            code
        }
        Err(e) => {
            error!("{}", e);
            match e {
                GeneratorError::Cancelled => 130,
                _ => 1,
            }
        }
    }
}

fn build_filter(cli: &Cli) -> Result<EndpointFilter, String> {
    let parse_methods = |raw: &[String]| -> Result<Vec<HttpMethod>, String> {
        raw.iter().map(|m| HttpMethod::from_str(m)).collect()
    };

    Ok(EndpointFilter {
        include_tags: cli.include_tags.clone(),
        exclude_tags: cli.exclude_tags.clone(),
        include_paths: cli.include_paths.clone(),
        exclude_paths: cli.exclude_paths.clone(),
        include_methods: parse_methods(&cli.methods)?,
        exclude_methods: parse_methods(&cli.exclude_methods)?,
    })
}

fn apply_cli_overrides(config: &mut CasecraftConfig, cli: &Cli) {
    if let Some(providers) = &cli.providers {
        config.providers.active = providers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(strategy) = &cli.strategy {
        config.strategy = strategy.clone();
    }
    if let Some(fallback) = &cli.fallback {
        config.providers.fallback_chain = fallback
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(mapping) = &cli.manual_mapping {
        config.manual_mapping = Some(mapping.clone());
    }
    if let Some(seed) = cli.seed {
        config.random_seed = Some(seed);
    }
    if let Some(output) = &cli.output {
        config.output.directory = output.to_string_lossy().into_owned();
    }
    if cli.organize_by_tag {
        config.output.organize_by_tag = true;
    }
    if let Some(state) = &cli.state {
        config.state_path = state.to_string_lossy().into_owned();
    }
}
