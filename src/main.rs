//! PyDSL - Main entry point

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pydsl::batch::{BatchManifest, run_batch};
use pydsl::cli::{Cli, Commands};
use pydsl::{
    CodeFragment, CollectionId, CollectionService, EngineConfig, ExecutionEngine,
    InMemoryFragmentStore, InvocationRequest, InvocationResult, TransportValue, process_guard,
};

/// Initialize the logger: stderr, `info` unless RUST_LOG says otherwise
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logger();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    match &cli.command {
        Commands::CheckConfig { config } => Ok(check_config(config)),
        Commands::Exec {
            fragments,
            entry,
            args,
            kwargs,
        } => {
            let request = parse_request(entry, args, kwargs)?;
            let sources = read_fragments(fragments)?;
            let engine = start_engine(&cli).await?;

            let collection_id = CollectionId::new();
            let snapshot: Vec<CodeFragment> = sources
                .into_iter()
                .map(|source| CodeFragment::new(collection_id, source))
                .collect();

            let outcome = engine.execute(&snapshot, &request).await;
            engine.shutdown().await;
            let result = outcome?;

            println!("{}", serde_json::to_string(&result)?);
            Ok(exit_code_for(&result))
        }
        Commands::Batch { manifest } => {
            let manifest = BatchManifest::load_from_file(manifest)?;
            let engine = start_engine(&cli).await?;
            let service = CollectionService::new(Arc::new(InMemoryFragmentStore::new()), engine);

            let outcome = run_batch(&service, &manifest).await;
            service.engine().shutdown().await;
            let lines = outcome?;

            let mut all_values = true;
            for line in &lines {
                all_values &= line.is_value();
                println!("{}", serde_json::to_string(line)?);
            }

            Ok(if all_values {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn check_config(path: &Path) -> ExitCode {
    info!("Validating configuration file: {:?}", path);
    match EngineConfig::load_from_file(path) {
        Ok(config) => match config.validate() {
            Ok(_) => {
                info!("Configuration validation successful");
                println!("✓ Configuration file is valid: {:?}", config);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("Failed to load configuration file: {:#}", e);
            eprintln!("✗ Failed to load configuration file: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Config file, then environment, then command-line flags
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(size) = cli.pool_size {
        config.pool_size = size;
    }
    if let Some(interpreter) = &cli.interpreter {
        config.interpreter = interpreter.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn start_engine(cli: &Cli) -> Result<ExecutionEngine> {
    let config = load_config(cli)?;
    let engine = ExecutionEngine::start(&config)
        .await
        .context("Failed to start worker pool")?;

    // Workers are in their own process groups, so terminal signals need to be
    // forwarded by hand
    if let Err(e) = process_guard::init_signal_handlers(engine.pool().registry().clone()) {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    Ok(engine)
}

fn parse_request(entry: &str, args: &str, kwargs: &str) -> Result<InvocationRequest> {
    let args: Vec<TransportValue> =
        serde_json::from_str(args).context("--args must be a JSON array")?;
    let kwargs: BTreeMap<String, TransportValue> =
        serde_json::from_str(kwargs).context("--kwargs must be a JSON object")?;

    Ok(InvocationRequest {
        entry_point: entry.to_string(),
        args,
        kwargs,
    })
}

fn read_fragments(paths: &[PathBuf]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read fragment {:?}", path))
        })
        .collect()
}

fn exit_code_for(result: &InvocationResult) -> ExitCode {
    if result.is_value() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
