//! mqwatch daemon entry point.

use clap::{Parser, Subcommand};
use mqwatch::config::WatcherConfig;
use mqwatch::dispatch::{EventDispatcher, LogAlertPresenter, WatcherEvent};
use mqwatch::observability::init_default_logging;
use mqwatch::transport::mqtt::configure_mqtt_options;
use mqwatch::transport::MqttTransport;
use mqwatch::watcher::LifecycleController;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Persistent MQTT topic watcher with automatic reconnection
#[derive(Parser)]
#[command(name = "mqwatch")]
#[command(about = "Watch an MQTT topic and alert on every message")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watcher daemon
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting mqwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_watcher(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<WatcherConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(WatcherConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = vec!["mqwatch.toml", "config/mqwatch.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(WatcherConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Provide one with -c/--config or create mqwatch.toml"
            );
            process::exit(1);
        }
    }
}

fn handle_config_command(
    config: WatcherConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Configuration is valid");
    if show {
        println!("watcher id:  {}", config.watcher.id);
        println!("broker:      {}", config.mqtt.broker_url);
        println!("topic:       {}", config.mqtt.topic);
        println!("qos:         {}", config.mqtt.qos);
        println!("retry delay: {}ms", config.retry.delay_ms);
        match config.retry.max_attempts {
            Some(max) => println!("max retries: {max}"),
            None => println!("max retries: unlimited"),
        }
    }
    Ok(())
}

async fn run_watcher(config: WatcherConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Watcher starting with id: {}", config.watcher.id);

    // Surface a bad broker URL now rather than inside the retry loop.
    configure_mqtt_options(&config.watcher.id, &config.mqtt)?;

    let transport = MqttTransport::new(config.watcher.id.clone(), config.mqtt.clone());
    let dispatcher = Arc::new(EventDispatcher::new(Arc::new(LogAlertPresenter)));

    let controller = LifecycleController::spawn(config, transport, Arc::clone(&dispatcher));
    let (_observer_id, mut events) = controller.observe();

    // Mirror every observer event into the log so the daemon is inspectable
    // without attaching anything.
    let observer_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                WatcherEvent::Status(status) => {
                    info!(connected = status.connected, error = ?status.error, "status changed");
                }
                WatcherEvent::Message(message) => {
                    info!(topic = %message.topic, bytes = message.payload.len(), "message received");
                }
            }
        }
    });

    controller.start();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Watcher is running; waiting for messages...");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    controller.shutdown().await;
    observer_task.abort();

    Ok(())
}
