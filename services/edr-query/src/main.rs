//! EDR query tool
//!
//! Opens a local Zarr store and answers one position, area or collection
//! request. The response document goes to stdout, logs go to stderr.

mod cli;
mod run;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use cli::Args;
use grid_processor::{GridProcessorConfig, QueryService};

fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(args)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_command(args: Args) -> anyhow::Result<ExitCode> {
    let config = GridProcessorConfig::from_env();
    info!(
        store = %args.store.display(),
        cache_mb = config.chunk_cache_size_mb,
        "Opening dataset"
    );

    let (document, code) = match QueryService::open(&args.store, &config) {
        Ok(service) => {
            let result = run::execute(&service, &args.command).await;
            let stats = service.cache_stats().await;
            info!(
                hits = stats.hits,
                misses = stats.misses,
                memory_bytes = stats.memory_bytes,
                "Chunk cache"
            );
            match result {
                Ok(document) => (document, ExitCode::SUCCESS),
                Err(e) => {
                    error!(status = e.status_code(), "{}", e);
                    (run::exception(&e, &args.command.instance()), ExitCode::FAILURE)
                }
            }
        }
        Err(e) => {
            error!(status = e.status_code(), "{}", e);
            let instance = args.store.display().to_string();
            (run::exception(&e, &instance), ExitCode::FAILURE)
        }
    };

    let output = serde_json::to_string_pretty(&document).context("failed to encode response")?;
    println!("{}", output);
    Ok(code)
}
