//! Binary driver for the tick-loop server.
//!
//! Loads configuration, resolves the protocol wrapper by name and drives
//! [`Server::tick`] until the process is terminated. When a tick reports no
//! work the driver sleeps briefly instead of busy-spinning.

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use tickloop::config::{load_config, Config};
use tickloop::observability::logging::init_logging;
use tickloop::{Server, WrapperRegistry};

/// How long the driver sleeps after an idle tick.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// How often the driver logs uptime and connection counts.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "tickloop")]
#[command(about = "Single-threaded non-blocking TCP/TLS server", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tickloop.toml")]
    config: PathBuf,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    init_logging("tickloop=debug");

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        match load_config(&cli.config) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(path = %cli.config.display(), error = %err, "failed to load config");
                process::exit(1);
            }
        }
    } else {
        tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let registry = WrapperRegistry::with_defaults();
    let wrapper = match registry.resolve(&config.wrapper.name, &config.wrapper.options) {
        Ok(wrapper) => wrapper,
        Err(err) => {
            tracing::error!(wrapper = %config.wrapper.name, error = %err, "failed to resolve wrapper");
            process::exit(1);
        }
    };

    let mut server = Server::new(config.server, wrapper);
    if let Err(err) = server.start() {
        tracing::error!(error = %err, "failed to start server");
        process::exit(1);
    }

    let mut last_status = Instant::now();
    loop {
        let has_work = server.tick();

        if last_status.elapsed() >= STATUS_INTERVAL {
            server.log_uptime();
            server.log_status();
            last_status = Instant::now();
        }

        if !has_work {
            thread::sleep(IDLE_SLEEP);
        }
    }
}
