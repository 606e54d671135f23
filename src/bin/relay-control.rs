//! Bench tool for checking relay wiring.
//!
//! Toggles a single relay switch every time a line is read from stdin.
//!
//! Usage:
//!   cargo run --bin relay-control -- 24
//!   cargo run --bin relay-control -- 22 --active-high --settle-secs 1

use clap::Parser;
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thermabox::error::Result;
use thermabox::gpio::{GpioBackend, MockGpio, SysfsGpio};
use thermabox::relay::Relay;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "relay-control")]
#[command(about = "Toggle a relay switch on every line read from stdin")]
struct Cli {
    /// GPIO pin driving the relay
    #[arg(default_value_t = 24)]
    pin: u8,

    /// Relay energizes on a high level
    #[arg(long)]
    active_high: bool,

    /// Pause after each toggle so the contacts can settle
    #[arg(long, default_value_t = 3)]
    settle_secs: u64,

    /// Use an in-memory GPIO board
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("relay-control failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Testing pin: {}", cli.pin);
    let gpio: Arc<dyn GpioBackend> = if cli.dry_run {
        Arc::new(MockGpio::new())
    } else {
        Arc::new(SysfsGpio::open()?)
    };
    let relay = Relay::new(gpio, cli.active_high, &[cli.pin])?;
    let settle = Duration::from_secs(cli.settle_secs);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while lines.next_line().await?.is_some() {
        relay.toggle(1)?;
        info!("Switch 1 (pin {}) is now {}", cli.pin, if relay.is_on(1)? { "on" } else { "off" });
        tokio::time::sleep(settle).await;
    }
    info!("stdin closed, leaving relay as is");
    Ok(())
}
