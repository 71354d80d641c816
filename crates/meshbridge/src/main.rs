//! MeshBridge daemon entry point.
//!
//! Builds a bridge from command-line parameters and drives its maintenance
//! tick until shutdown. Port attachment and frame I/O are wired in by the
//! embedding platform; run standalone this demonstrates the control loop.

use clap::Parser;
use meshbridge::{Bridge, BridgeConfig, FrameSink, PortIndex};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// MeshBridge - software mesh Ethernet bridge
#[derive(Parser, Debug)]
#[command(name = "bridged")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bridge priority (high 16 bits of the bridge id)
    #[arg(short = 'p', long, default_value = "32768")]
    priority: u16,

    /// Static bridge MAC address (e.g. 02:aa:bb:cc:dd:ee)
    #[arg(short = 'm', long)]
    mac_address: Option<String>,

    /// FDB ageing time in seconds
    #[arg(long, default_value = "300")]
    ageing_time: u64,

    /// STP hello time in seconds
    #[arg(long, default_value = "2")]
    hello_time: u64,

    /// STP max age in seconds
    #[arg(long, default_value = "20")]
    max_age: u64,

    /// STP forward delay in seconds
    #[arg(long, default_value = "15")]
    forward_delay: u64,

    /// Maintenance tick interval in milliseconds
    #[arg(long, default_value = "1000")]
    tick_interval: u64,

    /// Enable uplink/proxy mode (requires a static MAC)
    #[arg(long)]
    proxy_uplink: bool,

    /// Log filter (e.g. info, meshbridge=debug)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

/// Sink for a bridge with no attached interfaces: counts and drops.
struct DiscardSink;

impl FrameSink for DiscardSink {
    fn transmit(&self, port: PortIndex, frame: &[u8]) {
        tracing::trace!(port = port.0, len = frame.len(), "frame discarded (no wiring)");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("====================================================================");
    info!("Starting MeshBridge daemon");
    info!("====================================================================");
    info!("Bridge priority: 0x{:04x}", args.priority);
    info!("Ageing time: {}s", args.ageing_time);
    info!(
        "STP timers: hello {}s, max age {}s, forward delay {}s",
        args.hello_time, args.max_age, args.forward_delay
    );
    info!("Tick interval: {}ms", args.tick_interval);

    let static_mac = match args.mac_address.as_deref().map(str::parse) {
        Some(Ok(mac)) => {
            info!("Static bridge MAC: {}", mac);
            Some(mac)
        }
        Some(Err(err)) => {
            warn!("invalid --mac-address: {}", err);
            return ExitCode::FAILURE;
        }
        None => None,
    };

    let config = BridgeConfig {
        priority: args.priority,
        static_mac,
        ageing_time: Duration::from_secs(args.ageing_time),
        hello_time: Duration::from_secs(args.hello_time),
        max_age: Duration::from_secs(args.max_age),
        forward_delay: Duration::from_secs(args.forward_delay),
        proxy_uplink: args.proxy_uplink,
        ..Default::default()
    };

    let bridge = match Bridge::new(config) {
        Ok(bridge) => Arc::new(bridge),
        Err(err) => {
            warn!("invalid bridge configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let sink = DiscardSink;

    bridge.set_stp_enabled(true, Instant::now(), &sink);
    info!("Bridge running: {:?}", bridge);

    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_interval));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                bridge.on_tick(Instant::now(), &sink);
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!("signal listener failed: {}", err);
                }
                break;
            }
        }
    }

    info!(
        "Shutting down; status: {}",
        serde_json::to_string(&bridge.status()).unwrap_or_default()
    );
    info!(
        "Final stats: {}",
        serde_json::to_string(&bridge.stats()).unwrap_or_default()
    );
    ExitCode::SUCCESS
}
