//! unitlink - MQTT device unit entry point

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use unitlink::config::UnitConfig;
use unitlink::device::SensorHooks;
use unitlink::link::{ConnectionManager, Shutdown};
use unitlink::observability::{init_logging, logging, LogFormat};
use unitlink::transport::mqtt::MqttClient;

/// Default unit label when no identity is configured
const DEFAULT_LABEL: &str = "unitlink";

/// Upper bound on the orderly teardown after a signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// MQTT device unit with automatic reconnection
#[derive(Parser)]
#[command(name = "unitlink")]
#[command(about = "MQTT device unit with automatic reconnection")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace) unless a log level is set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    #[arg(long, env = "LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Log output format (json, pretty, compact)
    #[arg(long, env = "LOG_FORMAT", default_value = "json", global = true)]
    log_format: String,

    /// Log span open and close events ("true" enables)
    #[arg(long, env = "LOG_SPANS", default_value = "false", global = true)]
    log_spans: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and run the unit until SIGINT/SIGTERM
    Run,
    /// Validate configuration
    Config {
        /// Print the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_cli_logging(&cli);

    info!("Starting unitlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_unit(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn init_cli_logging(cli: &Cli) {
    init_logging(
        cli_log_level(cli),
        LogFormat::parse(&cli.log_format),
        logging::parse_spans(&cli.log_spans),
    );
}

/// An explicit log level wins over -v/-vv
fn cli_log_level(cli: &Cli) -> tracing::Level {
    match (cli.log_level.as_deref(), cli.verbose) {
        (Some(level), _) => logging::parse_level(level),
        (None, 0) => tracing::Level::INFO,
        (None, 1) => tracing::Level::DEBUG,
        (None, _) => tracing::Level::TRACE,
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<UnitConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(UnitConfig::load_from_file(path)?);
    }

    for candidate in ["unitlink.toml", "config/unitlink.toml"] {
        let path = Path::new(candidate);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(UnitConfig::load_from_file(path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create unitlink.toml".into())
}

async fn run_unit(config: UnitConfig) -> Result<(), Box<dyn std::error::Error>> {
    let label = config.unit.id.as_deref().unwrap_or(DEFAULT_LABEL);
    info!(
        unit = label,
        broker = %config.mqtt.broker_url,
        topic = %config.topics.publish_topic(),
        "Unit starting"
    );

    let transport = MqttClient::new(label, &config.mqtt)?;
    let hooks = SensorHooks::new(
        config.topics.publish_topic(),
        Duration::from_secs(config.sensor.interval_secs),
    );

    let shutdown = Shutdown::new();
    let options = config.link_options().with_shutdown(shutdown.clone());
    let manager = ConnectionManager::new(transport, hooks, options)?;
    let mut task = manager.start();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        _ = shutdown.wait() => info!("Link requested shutdown"),
        joined = &mut task => {
            joined?;
            warn!("Link stopped on its own");
            return Ok(());
        }
    }

    shutdown.trigger();

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
        Ok(joined) => joined?,
        Err(_) => {
            warn!("Link did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            task.abort();
        }
    }

    Ok(())
}

fn handle_config_command(config: &UnitConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
