//! SlicerHands driver - touchless hand tracking for slice navigation.
//!
//! Reads hand poses and pinch gestures from a tracking driver over TCP,
//! mirrors them as cursors in the scene and drags the slice views while the
//! navigating hand is pinched.

mod backend;
mod config;
mod connection;
mod cursor;
mod geometry;
mod jumper;
mod observer;
mod protocol;
mod scene;
mod state;

use clap::Parser;
use tracing::info;

use crate::config::{DriverConfig, TableDimensions, DEFAULT_HOST, DEFAULT_PORT};
use crate::cursor::Hand;

#[derive(Parser, Debug)]
#[command(name = "slicer-hands", about = "Touchless hand tracking slice navigation")]
struct Cli {
    /// Hand driver host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Hand driver TCP port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Hand whose pinch drags the slices: left or right
    #[arg(long, default_value = "right")]
    hand: String,

    /// Table size as WxHxD in scene units
    #[arg(long, default_value = "900x30x600")]
    table_dims: String,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Event loop poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Log every driver line
    #[arg(long)]
    trace_protocol: bool,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("slicer-hands {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slicer_hands=info".into()),
        )
        .init();

    info!("slicer-hands v{} starting", env!("CARGO_PKG_VERSION"));

    let Some(jump_hand) = Hand::parse(&cli.hand) else {
        eprintln!("Unknown hand: {}. Use: left or right", cli.hand);
        std::process::exit(1);
    };
    let Some(table) = TableDimensions::parse(&cli.table_dims) else {
        eprintln!(
            "Invalid table dimensions: {}. Use WxHxD with positive numbers",
            cli.table_dims
        );
        std::process::exit(1);
    };

    let driver = DriverConfig {
        host: cli.host,
        port: cli.port,
        jump_hand,
        table,
        trace_protocol: cli.trace_protocol,
    };
    info!(address = %driver.address(), hand = jump_hand.as_str(), "driver configured");

    let headless = backend::HeadlessConfig {
        poll_interval_ms: cli.poll_interval_ms,
        exit_after: cli.exit_after,
        ..backend::HeadlessConfig::default()
    };

    backend::run(driver, headless)
}
