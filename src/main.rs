//! Glucose Telemetry CLI
//!
//! Runs the dashboard server, the simulated device feed, or shows the
//! configuration.

use clap::{Parser, Subcommand};
use glucose_telemetry::{config::Config, VERSION};

#[cfg(feature = "device")]
use glucose_telemetry::device::{DeviceClient, DeviceFeed, SyntheticOptics};
#[cfg(feature = "device")]
use std::time::Duration;

#[cfg(feature = "server")]
use glucose_telemetry::core::Engine;
#[cfg(feature = "server")]
use glucose_telemetry::server::{self, ServerConfig};
#[cfg(feature = "server")]
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "glucose-telemetry")]
#[command(version = VERSION)]
#[command(about = "Pseudo-glucose telemetry engine and dashboard backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dashboard HTTP server
    #[cfg(feature = "server")]
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Fixed seed for the noise generator
        #[arg(long)]
        seed: Option<u64>,

        /// IANA timezone for rendered clock times
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Push simulated wearable readings to a running server
    #[cfg(feature = "device")]
    Device {
        /// Base URL of the server
        #[arg(long)]
        url: Option<String>,

        /// Seconds between pushes
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many pushes
        #[arg(long)]
        count: Option<u64>,

        /// Identifier sent with each push
        #[arg(long)]
        device_id: Option<String>,

        /// Fixed seed for the synthetic optics
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load configuration ({e}), using defaults");
            Config::default()
        }
    };

    init_logging(&config.log_level);

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve {
            host,
            port,
            seed,
            timezone,
        } => cmd_serve(config, host, port, seed, timezone).await,
        #[cfg(feature = "device")]
        Commands::Device {
            url,
            interval,
            count,
            device_id,
            seed,
        } => cmd_device(config, url, interval, count, device_id, seed).await,
        Commands::Config { init } => cmd_config(&config, init),
    }
}

/// RUST_LOG wins over the configured level.
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

#[cfg(feature = "server")]
async fn cmd_serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    seed: Option<u64>,
    timezone: Option<String>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(timezone) = timezone {
        config.timezone = timezone;
    }
    config.seed = seed.or(config.seed);

    let server_config = ServerConfig::from_config(&config)?;

    println!("Glucose Telemetry v{VERSION}");
    println!();
    println!("  Timezone: {}", server_config.engine.timezone.name());
    println!(
        "  Noise seed: {}",
        server_config
            .engine
            .seed
            .map_or_else(|| "random".to_string(), |s| s.to_string())
    );

    let engine = Arc::new(Engine::new(server_config.engine.clone()));
    let (addr, shutdown) = server::run(engine.clone(), server_config.addr()).await?;

    println!("  Listening on: http://{addr}");
    println!();
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    let _ = shutdown.send(());

    println!();
    println!("{}", engine.activity().summary(engine.now()));
    println!();
    println!("Server stopped.");
    Ok(())
}

#[cfg(feature = "device")]
async fn cmd_device(
    mut config: Config,
    url: Option<String>,
    interval: Option<u64>,
    count: Option<u64>,
    device_id: Option<String>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(url) = url {
        config.device.server_url = url;
    }
    if let Some(secs) = interval {
        config.device.push_interval = Duration::from_secs(secs);
    }
    if device_id.is_some() {
        config.device.device_id = device_id;
    }

    let client = DeviceClient::new(&config.device)?;

    println!("Glucose Telemetry v{VERSION} - device simulator");
    println!();
    println!("  Server: {}", config.device.server_url);
    println!("  Device ID: {}", client.device_id());
    println!(
        "  Push interval: {}s",
        config.device.push_interval.as_secs()
    );

    match client.test_connection().await {
        Ok(true) => println!("  Server connection: OK"),
        Ok(false) => eprintln!("Warning: Server health check failed"),
        Err(e) => eprintln!("Warning: Could not connect to server: {e}"),
    }

    println!();
    println!("Press Ctrl+C to stop");

    let feed = DeviceFeed::new(client, SyntheticOptics::new(seed), config.device.push_interval);
    let report = feed
        .run(count, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    println!();
    println!(
        "Device feed stopped: {} pushed, {} failed",
        report.pushed, report.failed
    );
    Ok(())
}

fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        config.save()?;
        println!("Wrote {:?}", Config::config_path());
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
    Ok(())
}
