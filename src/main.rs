//! Kilometers - transparent JSON-RPC interception for wrapped MCP servers.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kilometers::config::{debug_enabled, ConfigError, ConfigLoader, KmConfig, ENV_DEBUG};
use kilometers::dispatch::{ApiClient, Dispatcher, LogDispatcher};
use kilometers::interceptor::Interceptor;
use kilometers::process::CommandSpec;

#[derive(Parser)]
#[command(
    name = "km",
    about = "Wrap an MCP server and report its JSON-RPC traffic",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Events per submitted batch.
    #[arg(long, value_name = "N")]
    batch_size: Option<NonZeroUsize>,

    /// Events buffered before new ones are dropped.
    #[arg(long, value_name = "N")]
    queue_capacity: Option<NonZeroUsize>,

    /// Only log captured batches instead of sending them.
    #[arg(long)]
    no_telemetry: bool,

    /// The server command and its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

fn init_tracing(verbosity: u8, debug: bool) {
    let level = match (verbosity, debug) {
        (0, false) => "warn",
        (1, false) => "info",
        (0..=2, _) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries the relayed protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn config_loader(cli: &Cli) -> ConfigLoader {
    match &cli.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::new(),
    }
}

/// Apply environment and CLI overrides to a loaded file config.
fn resolve_config(cli: &Cli, mut config: KmConfig) -> Result<KmConfig, ConfigError> {
    config.apply_process_env();
    config.validate()?;

    if let Some(size) = cli.batch_size {
        config.batch_size = size.get();
    }
    if let Some(capacity) = cli.queue_capacity {
        config.queue_capacity = capacity.get();
    }
    if cli.no_telemetry {
        config.telemetry = false;
    }
    Ok(config)
}

fn build_dispatcher(config: &KmConfig) -> Arc<dyn Dispatcher> {
    if !config.telemetry {
        return Arc::new(LogDispatcher);
    }
    match ApiClient::from_config(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Telemetry client unavailable, logging batches instead");
            Arc::new(LogDispatcher)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let loader = config_loader(&cli);
    let file_config = loader.load();

    // Logging must be up before environment overrides run so their
    // warnings are visible.
    let env_debug = std::env::var(ENV_DEBUG).is_ok_and(|v| debug_enabled(&v));
    let file_debug = file_config.as_ref().is_ok_and(|c| c.debug);
    init_tracing(cli.verbose, env_debug || file_debug);
    if let Some(path) = loader.find_config_file() {
        tracing::debug!(path = %path.display(), "Loaded config file");
    }

    let config = match file_config.and_then(|c| resolve_config(&cli, c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let spec = match CommandSpec::from_argv(cli.command) {
        Ok(spec) => spec,
        Err(e) => {
            tracing::error!(error = %e, "Invalid command");
            std::process::exit(1);
        }
    };

    let dispatcher = build_dispatcher(&config);
    let health = Arc::clone(&dispatcher);
    let endpoint = config.api_endpoint.clone();
    tokio::spawn(async move {
        if let Err(e) = health.health_check().await {
            tracing::warn!(endpoint = %endpoint, error = %e, "Telemetry endpoint unreachable");
        }
    });

    tracing::info!(
        program = %spec.program(),
        batch_size = config.batch_size,
        queue_capacity = config.queue_capacity,
        telemetry = config.telemetry,
        "Starting Kilometers wrapper"
    );

    let mut interceptor = Interceptor::from_config(&config, dispatcher);
    let code = match interceptor.run(&spec).await {
        Ok(report) => report.exit_code(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to run wrapped process");
            1
        }
    };

    // Exit directly: a pending read on stdin would keep the runtime from
    // shutting down.
    std::process::exit(code);
}
