//! Ethereum Validator Service: HTTP API for block rewards and sync duties
//!
//! Serves `GET /blockreward/{slot}` and `GET /syncduties/{slot}` on top of an
//! Ethereum node provider. Every request carries the shared API key; the first
//! accepted request opens a session pinned to the caller's IP.
//!
//! Usage:
//!   eth-validator --port 8080 --default-api-key s3cret \
//!       --backend-endpoint https://mainnet.example.io --backend-token abc
//!   eth-validator launch                       # same, options from ETHVAL_* env
//!   eth-validator version

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use validator_protocol::APP_NAME;
use validator_server::{LaunchSettings, ServerConfig, ValidatorServer};
use validator_services::{BlockRewardService, RpcBackend, SyncDutiesService};
use validator_transport::TransportServer;

/// How long a fatal startup error stays on screen before the process exits.
const FATAL_EXIT_DELAY_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[command(
    name = "eth-validator",
    about = "Ethereum Validator Service: block rewards and sync duties over HTTP",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    launch: LaunchArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the API server (default when no subcommand is given)
    Launch(LaunchArgs),
    /// Show the version
    Version,
}

#[derive(Args, Debug, Clone)]
struct LaunchArgs {
    /// Port to listen on (1024-65535)
    #[arg(long, env = "ETHVAL_PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(long, env = "ETHVAL_HOST")]
    host: Option<String>,

    /// API key every client must send in `Validator-Api-Key`
    #[arg(long, env = "ETHVAL_DEFAULT_API_KEY", hide_env_values = true)]
    default_api_key: Option<String>,

    /// Ethereum node provider URL
    #[arg(long, env = "ETHVAL_BACKEND_ENDPOINT")]
    backend_endpoint: Option<String>,

    /// Ethereum node provider access token
    #[arg(long, env = "ETHVAL_BACKEND_TOKEN", hide_env_values = true)]
    backend_token: Option<String>,

    /// Also write logs to eth-validator_<timestamp>.log
    #[arg(
        long,
        env = "ETHVAL_LOG_FILE",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "false"
    )]
    log_file: bool,

    /// Emit logs as JSON lines on stdout
    #[arg(long, env = "ETHVAL_LOG_JSON")]
    log_json: bool,

    /// Upper bound for a single request, in seconds
    #[arg(long, env = "ETHVAL_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// How long in-flight requests may drain on shutdown, in seconds
    #[arg(long, env = "ETHVAL_SHUTDOWN_GRACE_SECS")]
    shutdown_grace_secs: Option<u64>,

    /// Idle session lifetime in seconds (0 keeps sessions until shutdown)
    #[arg(long, env = "ETHVAL_SESSION_TTL_SECS")]
    session_ttl_secs: Option<u64>,

    /// Disable CORS headers
    #[arg(
        long,
        env = "ETHVAL_NO_CORS",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "false"
    )]
    no_cors: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

impl LaunchArgs {
    fn settings(&self) -> LaunchSettings {
        LaunchSettings {
            port: self.port,
            host: self.host.clone(),
            default_api_key: self.default_api_key.clone().map(SecretString::from),
            backend_endpoint: self.backend_endpoint.clone(),
            backend_token: self.backend_token.clone().map(SecretString::from),
            log_file: self.log_file,
            request_timeout_secs: self.request_timeout_secs,
            shutdown_grace_secs: self.shutdown_grace_secs,
            session_ttl_secs: self.session_ttl_secs,
            no_cors: self.no_cors,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => fatal_exit(&e, Some("Run with --help to list the available options."), 1),
    };

    let args = match cli.command {
        Some(Command::Version) => {
            println!("{APP_NAME} v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(Command::Launch(args)) => args,
        None => cli.launch,
    };

    let config = match ServerConfig::from_settings(args.settings()) {
        Ok(config) => config,
        Err(e) => fatal_exit(&e, Some(e.hint()), 1),
    };

    init_tracing(args.verbose, args.log_json, config.log_file);
    run(config).await
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let backend = Arc::new(RpcBackend::new(&config.backend).context("failed to create backend client")?);
    info!(endpoint = backend.endpoint(), "Using Ethereum node provider");

    let mut server = ValidatorServer::new();
    server.register_service(BlockRewardService::new(backend.clone()));
    server.register_service(SyncDutiesService::new(backend));
    server
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("initialization failed: {e}"))?;
    let server = Arc::new(server);

    let mut transport = TransportServer::new(config.transport_config(), server.clone())
        .context("initialization failed")?;
    let addr = transport.open_comms().await.context("unable to start api server")?;
    info!("{APP_NAME} v{} listening on {addr}", env!("CARGO_PKG_VERSION"));

    let shutdown = transport.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    transport.run_until_shutdown().await;
    server.shutdown().await;
    info!("{APP_NAME} stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => debug!("Caught signal: interrupt"),
        _ = terminate => debug!("Caught signal: terminate"),
    }
}

fn init_tracing(verbose: bool, log_json: bool, log_file: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let (plain, json) = if log_json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    let mut file_error = None;
    let file_layer = if log_file {
        let name = format!("eth-validator_{}.log", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
        match OpenOptions::new().create(true).append(true).open(&name) {
            Ok(file) => Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false)),
            Err(e) => {
                file_error = Some((name, e));
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .with(file_layer)
        .init();

    if let Some((name, e)) = file_error {
        warn!("Unable to write to log file '{name}' ({e}); please check disk space and folder permissions");
    }
}

/// Print the error, wait so the operator can read it, then exit.
fn fatal_exit(err: &dyn std::fmt::Display, hint: Option<&str>, code: i32) -> ! {
    println!("{err}");
    if let Some(hint) = hint {
        println!("{hint}");
    }
    println!("Shutting down in {FATAL_EXIT_DELAY_SECS} seconds...");
    std::thread::sleep(Duration::from_secs(FATAL_EXIT_DELAY_SECS));
    std::process::exit(code)
}
