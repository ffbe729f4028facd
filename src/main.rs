//! Modbus TCP register poller.
//!
//! Continuously polls the points named in the configuration file, or
//! performs a single read/write when given a subcommand. Addresses use PLC
//! documentation numbering (holding registers from 400001, coils from
//! 100001).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;

use modbus_poller::config::{LoggingConfig, PollerConfig};
use modbus_poller::init_tracing;
use modbus_poller::link::ModbusLink;
use modbus_poller::ops;
use modbus_poller::poller::Poller;

/// Modbus TCP register poller.
#[derive(Parser, Debug)]
#[command(name = "modbus-poller")]
#[command(about = "Polls registers and coils on a Modbus TCP device")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "poller.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Continuously poll the configured points (the default)
    Poll,
    /// Read a single holding register
    Read { address: u32 },
    /// Read a range of consecutive holding registers
    ReadMany { address: u32, count: u16 },
    /// Write a single holding register
    Write { address: u32, value: u16 },
    /// Read a single coil
    ReadCoil { address: u32 },
    /// Write a single coil
    WriteCoil { address: u32, value: bool },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = PollerConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let logging = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
    };
    init_tracing(&logging).context("Failed to init tracing")?;

    let link = Arc::new(ModbusLink::new(&config.device)?);

    match args.command.unwrap_or(Command::Poll) {
        Command::Poll => run_poll(link, &config).await,
        Command::Read { address } => {
            let value = ops::read_register(link.as_ref(), address).await?;
            println!("{}: {}", address, value);
            Ok(())
        }
        Command::ReadMany { address, count } => {
            let values = ops::read_registers(link.as_ref(), address, count).await?;
            for (i, value) in values.into_iter().enumerate() {
                println!("{}: {}", address + i as u32, value);
            }
            Ok(())
        }
        Command::Write { address, value } => {
            ops::write_register(link.as_ref(), address, value).await?;
            Ok(())
        }
        Command::ReadCoil { address } => {
            let value = ops::read_coil(link.as_ref(), address).await?;
            println!("{}: {}", address, value);
            Ok(())
        }
        Command::WriteCoil { address, value } => {
            ops::write_coil(link.as_ref(), address, value).await?;
            Ok(())
        }
    }
}

/// Spawn one poller per configured point and run until a shutdown signal.
async fn run_poll(link: Arc<ModbusLink>, config: &PollerConfig) -> Result<()> {
    if config.poll.points.is_empty() {
        anyhow::bail!("No poll points configured");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (sample_tx, mut sample_rx) = mpsc::channel(64);

    let mut tasks = Vec::new();
    for point in &config.poll.points {
        let poller = Poller::new(
            link.clone(),
            point.clone(),
            &config.poll,
            sample_tx.clone(),
            shutdown_rx.clone(),
        );
        tasks.push(tokio::spawn(poller.run()));
    }
    drop(sample_tx);

    // One output line per polled value, attributed to its logical address.
    let printer = tokio::spawn(async move {
        while let Some(sample) = sample_rx.recv().await {
            info!("{}: {}", sample.address, sample.value);
        }
    });

    info!(
        "Polling {} point(s). Press Ctrl+C to stop.",
        config.poll.points.len()
    );

    wait_for_signal().await;

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for pollers to finish their current cycle
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    // Pollers dropped their sample senders; the printer drains and exits.
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    info!("Poller stopped");
    Ok(())
}

async fn wait_for_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
