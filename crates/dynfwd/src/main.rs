// # dynfwd - Dynamic Firewall Daemon
//
// This daemon is a THIN integration layer: it reads configuration, builds
// the components and hands them to `dynfw_core::SyncEngine`. All update
// logic lives in dynfw-core.
//
// The dynfwd daemon is responsible for:
// 1. Parsing the firewall rule names from the command line
// 2. Reading configuration from environment variables
// 3. Initializing logging and the runtime
// 4. Building the IP source, firewall provider and state store
// 5. Running the engine until SIGINT or SIGTERM
//
// ## Configuration
//
// Rule names are positional arguments. Everything else is optional and
// read from environment variables:
//
// - `DYNFW_IP_SOURCE_URL`: IP-echo endpoint (default ipify JSON)
// - `DYNFW_IP_TIMEOUT_SECS`: IP lookup timeout (default 10)
// - `DYNFW_CREDENTIALS_PATH`: Service-account key (default /secrets/gcp-credentials.json)
// - `DYNFW_PROJECT_ID`: Project owning the rules (default: from the key)
// - `DYNFW_COMPUTE_API_BASE`: Compute REST base (default v1 endpoint)
// - `DYNFW_STATE_PATH`: IP history file (default ./ip_addresses.json)
// - `DYNFW_POLL_INTERVAL_SECS`: Wait between checks (default 180)
// - `DYNFW_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DYNFW_CREDENTIALS_PATH=/etc/dynfw/key.json
// export DYNFW_POLL_INTERVAL_SECS=300
//
// dynfwd allow-home-ssh allow-home-https
// ```

mod shutdown;

use anyhow::Result;
use clap::Parser;
use dynfw_core::config::{CredentialConfig, StateStoreConfig, UpdaterConfig};
use dynfw_core::{FileStateStore, MemoryStateStore, StateStore, SyncEngine};
use dynfw_ip_http::HttpIpSource;
use dynfw_provider_gcp::{GcpFirewallProvider, ServiceAccountCredentials};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DynfwExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DynfwExitCode> for ExitCode {
    fn from(code: DynfwExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dynfwd",
    about = "Keep firewall rule source ranges pinned to the current public IP",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Firewall rules to update, in order
    #[arg(value_name = "RULES", required = true, num_args = 1..)]
    rules: Vec<String>,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    updater: UpdaterConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env(rules: Vec<String>) -> Result<Self> {
        Self::from_lookup(rules, |key| env::var(key).ok())
    }

    /// Build configuration from `rules` and a variable lookup
    fn from_lookup<F>(rules: Vec<String>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut updater = UpdaterConfig::new(rules);

        if let Some(url) = lookup("DYNFW_IP_SOURCE_URL") {
            updater.ip_source.url = url;
        }
        if let Some(secs) = parse_secs(&lookup, "DYNFW_IP_TIMEOUT_SECS")? {
            updater.ip_source.timeout_secs = secs;
        }
        if let Some(path) = lookup("DYNFW_CREDENTIALS_PATH") {
            updater.credentials = CredentialConfig {
                path: PathBuf::from(path),
            };
        }
        if let Some(project) = lookup("DYNFW_PROJECT_ID") {
            updater.firewall.project_id = Some(project);
        }
        if let Some(base) = lookup("DYNFW_COMPUTE_API_BASE") {
            updater.firewall.api_base = base;
        }
        if let Some(path) = lookup("DYNFW_STATE_PATH") {
            updater.state_store = StateStoreConfig::File {
                path: PathBuf::from(path),
            };
        }
        if let Some(secs) = parse_secs(&lookup, "DYNFW_POLL_INTERVAL_SECS")? {
            updater.engine.poll_interval_secs = secs;
        }

        Ok(Self {
            updater,
            log_level: lookup("DYNFW_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.updater.validate()?;
        self.tracing_level()?;
        Ok(())
    }

    fn tracing_level(&self) -> Result<Level> {
        Ok(match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => anyhow::bail!(
                "DYNFW_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds. Got: {}", key, value))
        })
        .transpose()
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                DynfwExitCode::ConfigError.into()
            } else {
                DynfwExitCode::CleanShutdown.into()
            };
        }
    };

    // Load configuration from environment
    let config = match Config::from_env(cli.rules) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DynfwExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DynfwExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = config.tracing_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DynfwExitCode::ConfigError.into();
    }

    info!(
        firewall_rule_names = ?config.updater.rules,
        "Starting dynfwd daemon"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DynfwExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(run_daemon(config));
    result.into()
}

/// Build the engine and run it until a shutdown signal
async fn run_daemon(config: Config) -> DynfwExitCode {
    let engine = match build_engine(&config.updater).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return DynfwExitCode::ConfigError;
        }
    };

    let shutdown = match shutdown::create_shutdown_token() {
        Ok(token) => token,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return DynfwExitCode::ConfigError;
        }
    };

    engine.run(shutdown).await;

    info!("Shutting down daemon");
    DynfwExitCode::CleanShutdown
}

/// Create the components from configuration
async fn build_engine(config: &UpdaterConfig) -> Result<SyncEngine> {
    let ip_source = HttpIpSource::from_config(&config.ip_source)?;

    let credentials = ServiceAccountCredentials::from_config(&config.credentials)?;
    let provider = GcpFirewallProvider::from_config(&config.firewall, Arc::new(credentials)).await?;
    info!(project = %provider.project_id(), "Loaded firewall credentials");

    let state_store: Box<dyn StateStore> = match &config.state_store {
        StateStoreConfig::File { path } => Box::new(FileStateStore::new(path).await?),
        StateStoreConfig::Memory => Box::new(MemoryStateStore::new()),
    };

    let (engine, events) = SyncEngine::new(
        Box::new(ip_source),
        Box::new(provider),
        state_store,
        config,
    )?;

    // Every event is already logged by the engine
    drop(events);

    Ok(engine)
}
