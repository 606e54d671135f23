use clap::Parser;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thermabox::config::{ProbeConfig, ThermaboxConfig};
use thermabox::controller::Thermabox;
use thermabox::error::{Result, ThermaboxError};
use thermabox::gpio::{GpioBackend, MockGpio, SysfsGpio};
use thermabox::instance_lock::InstanceLock;
use thermabox::interfaces::ThermaboxControl;
use thermabox::probe;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "thermabox")]
#[command(about = "Temperature controller", version)]
struct Cli {
    /// Configuration file (YAML)
    conf: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Temperature sensor: `config`, `local:<path>`, `sim:<value>`, a ws:// URL or an HTTP URL
    #[arg(short = 'S', long, default_value = "config")]
    sensor: String,

    /// Override the configured target temperature
    #[arg(short = 't', long, allow_negative_numbers = true)]
    temperature: Option<f64>,

    /// Override the configured threshold
    #[arg(short = 'T', long)]
    threshold: Option<f64>,

    /// Drive an in-memory GPIO board instead of /sys/class/gpio
    #[arg(long)]
    dry_run: bool,
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    info!("Starting Thermabox");

    match run(cli).await {
        Ok(()) => {
            info!("Thermabox stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Thermabox shutting down: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ThermaboxConfig::from_file(&cli.conf)?;
    config.apply_env_overrides();
    info!("Configuration loaded from {}", cli.conf.display());

    let _lock = InstanceLock::acquire()?;

    let gpio: Arc<dyn GpioBackend> = if cli.dry_run {
        info!("Dry run: relays drive an in-memory board");
        Arc::new(MockGpio::new())
    } else {
        Arc::new(SysfsGpio::open()?)
    };

    let probe_config = match ProbeConfig::from_sensor_arg(&cli.sensor)? {
        Some(probe_config) => probe_config,
        None => config.probe.clone().ok_or_else(|| {
            ThermaboxError::Config("no probe configured; add a `probe:` block or pass --sensor".into())
        })?,
    };
    let primary = probe::from_config(&probe_config).await?;

    let tbox = Arc::new(Thermabox::from_config(&config, gpio, primary)?);
    for extra in &config.extra_probes {
        let secondary = probe::build(extra)?;
        // Secondary probes only feed extras; report their failures there
        if let Err(e) = secondary.initialize().await {
            warn!("Secondary probe '{}' unavailable: {}", secondary.name(), e);
        }
        tbox.add_secondary_probe(secondary);
    }

    let (target, threshold) = tbox.limits();
    tbox.set_limits(
        cli.temperature.unwrap_or(target),
        cli.threshold.unwrap_or(threshold),
    )?;
    let (target, threshold) = tbox.limits();
    info!("  Target: {:.2} ± {:.2}", target, threshold);
    info!("  Probe: {}", probe_config.name());
    info!("  Disabled: {}", tbox.is_disabled());

    if cli.verbose {
        let (tx, mut rx) = mpsc::channel(16);
        tbox.register_channel(tx, "log");
        tokio::spawn(async move {
            while let Some(state) = rx.recv().await {
                match state.to_json() {
                    Ok(json) => debug!("[Thermabox] snapshot {}", json),
                    Err(e) => warn!("[Thermabox] Failed to encode snapshot: {}", e),
                }
            }
        });
    }

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    info!("Thermabox is running, press Ctrl+C to exit");
    tbox.run(token).await
}
