//! Janus Cast - send one TCP/UDP payload and report the outcome

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use janus_cast::app::metrics::{gather_text, init_metrics};
use janus_cast::app::{ConsoleDisplay, Orchestrator};
use janus_cast::config::{Config, DispatchSettings};
use janus_cast::error::{Error, Result};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "janus-cast", version, about = "Send one TCP/UDP payload and report the outcome")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print an example config and exit
    #[arg(long)]
    gen_config: bool,

    /// Empty the request log and exit
    #[arg(long)]
    clear_logs: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,

    /// Destination host
    #[arg(long)]
    ip: Option<String>,

    /// Destination port (1-65535)
    #[arg(long, allow_negative_numbers = true)]
    port: Option<i64>,

    /// Transport: TCP or UDP
    #[arg(long = "type", value_name = "TYPE")]
    kind: Option<String>,

    /// Literal payload, or a path to a file to send
    #[arg(long)]
    payload: Option<String>,

    /// Timeout in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Button name
    #[arg(long)]
    name: Option<String>,

    /// Send without waiting for a reply
    #[arg(long)]
    no_reply: bool,
}

impl Args {
    /// Apply command line overrides on top of the configured settings
    fn apply(&self, settings: &mut DispatchSettings) {
        if let Some(ip) = &self.ip {
            settings.ip = Some(ip.clone());
        }
        if let Some(port) = self.port {
            settings.port = Some(port);
        }
        if let Some(kind) = &self.kind {
            settings.kind = Some(kind.clone());
        }
        if let Some(payload) = &self.payload {
            settings.payload = Some(payload.clone());
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = Some(timeout);
        }
        if let Some(name) = &self.name {
            settings.name = Some(name.clone());
        }
        if self.no_reply {
            settings.expect_reply = Some(false);
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.gen_config {
        let config = Config::default_settings();
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        println!("{}", json);
        return Ok(ExitCode::SUCCESS);
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default_settings(),
    };
    args.apply(&mut config.settings);

    // Initialize logging
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("Failed to set tracing subscriber: {}", e)))?;

    if args.config.is_none() {
        info!("No config file specified, using default settings");
    }
    init_metrics();

    let rt = tokio::runtime::Runtime::new()?;
    let succeeded = rt.block_on(run(&args, &config))?;

    if args.metrics {
        print!("{}", gather_text()?);
    }

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run one dispatch (or the log reset) and wait for the display to settle
async fn run(args: &Args, config: &Config) -> Result<bool> {
    let orchestrator = Orchestrator::from_config(config, Arc::new(ConsoleDisplay::new()));

    if args.clear_logs {
        orchestrator.clear_logs().await?;
        return Ok(true);
    }

    info!("Janus Cast v{} starting...", env!("CARGO_PKG_VERSION"));
    let settings = orchestrator.apply_settings(&config.settings).await;
    let result = orchestrator.dispatch(&settings).await;
    orchestrator.settle().await;

    if let Some(store) = orchestrator.log_store() {
        info!("Request log: {}", store.path().display());
    }

    match result {
        Ok(outcome) => Ok(outcome.is_success()),
        // Already reported through the display
        Err(Error::Validation(_)) | Err(Error::PayloadFile(_)) | Err(Error::Busy) => Ok(false),
        Err(e) => Err(e),
    }
}
