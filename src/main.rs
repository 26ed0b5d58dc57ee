use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use pzem_rs::constants::{MODBUS_FUNCTION_READ_INPUT, PZEM_READ_ALL_COUNT};
use pzem_rs::modbus::frame::append_checksum;
use pzem_rs::{
    init_logger, init_logger_with_level, ConsoleDisplay, DisplayScheduler, LinkSupervisor,
    MeterReader, MockTransport, MonitorConfig, MonitorLoop, SerialTransport, SoftwareWatchdog,
    Transport,
};
use std::path::PathBuf;
use tokio::time::Instant;

#[derive(Parser)]
#[command(name = "pzem-monitor")]
#[command(about = "Monitor a PZEM-004T power meter over Modbus RTU")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Serial port, overrides the config file
    #[arg(long, global = true)]
    port: Option<String>,
    /// Meter address (1-247), overrides the config file
    #[arg(long, global = true)]
    address: Option<u8>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop until Ctrl-C
    Run {
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Use a simulated meter and log the display instead of driving hardware
        #[arg(long)]
        simulate: bool,
    },
    /// Take one reading and print it as JSON
    Read,
    /// Reset the meter's energy counter
    ResetEnergy,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_logger_with_level(LevelFilter::Debug);
    } else {
        init_logger();
    }

    let mut config = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(address) = cli.address {
        config.device_address = address;
    }
    if let Commands::Run {
        interval_ms: Some(interval_ms),
        ..
    } = cli.command
    {
        config.poll_interval_ms = interval_ms;
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Run { simulate: true, .. } => {
            log::info!("simulating meter 0x{:02X}", config.device_address);
            run_monitor(&config, MockTransport::answering(simulated_frame(config.device_address)))
                .await
        }
        Commands::Run { .. } => {
            let transport = SerialTransport::open(config.serial_config())
                .with_context(|| format!("opening {}", config.serial.port))?;
            run_monitor(&config, transport).await
        }
        Commands::Read => {
            let mut reader = open_reader(&config)?;
            let reading = match reader.try_poll().await {
                Ok(reading) => reading,
                Err(e) => {
                    log::error!("read failed: {e}");
                    pzem_rs::Reading::invalid()
                }
            };
            println!("{}", serde_json::to_string_pretty(&reading)?);
            anyhow::ensure!(
                reading.valid,
                "no valid reading from meter 0x{:02X}",
                config.device_address
            );
            Ok(())
        }
        Commands::ResetEnergy => {
            let mut reader = open_reader(&config)?;
            reader.reset_energy().await.context("energy reset failed")?;
            println!("energy counter reset on meter 0x{:02X}", config.device_address);
            Ok(())
        }
    }
}

fn open_reader(config: &MonitorConfig) -> anyhow::Result<MeterReader<SerialTransport>> {
    let transport = SerialTransport::open(config.serial_config())
        .with_context(|| format!("opening {}", config.serial.port))?;
    Ok(MeterReader::new(
        transport,
        config.device_address,
        config.response_wait(),
    ))
}

async fn run_monitor<T: Transport>(config: &MonitorConfig, transport: T) -> anyhow::Result<()> {
    let now = Instant::now();
    let reader = MeterReader::new(transport, config.device_address, config.response_wait());
    let link = LinkSupervisor::new(reader, config.link_policy());

    let layout = config.display.layout;
    let lcd = ConsoleDisplay::new(layout.rows(), layout.columns());
    let display = DisplayScheduler::new(lcd, layout, config.display_timing(), now);

    let mut monitor = MonitorLoop::new(link, display, config.loop_timing(), now);
    if let Some(timeout) = config.watchdog_timeout() {
        let watchdog = SoftwareWatchdog::new(timeout);
        tokio::spawn(watchdog.clone().supervise());
        monitor = monitor.with_watchdog(Box::new(watchdog));
    }

    monitor.startup(now).await;
    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

/// A healthy "read all" answer: 230.0 V, 1.500 A, 250.0 W, 1.000 Wh, 50.0 Hz, PF 0.95.
fn simulated_frame(device_address: u8) -> Vec<u8> {
    let words: [u16; PZEM_READ_ALL_COUNT as usize] = [2300, 1500, 0, 2500, 0, 1000, 0, 500, 95, 0];
    let mut frame = vec![device_address, MODBUS_FUNCTION_READ_INPUT, (words.len() * 2) as u8];
    for word in words {
        frame.extend_from_slice(&word.to_be_bytes());
    }
    append_checksum(&mut frame);
    frame
}
