use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use mavgate::bridge::{Bridge, BridgeConf};
use mavgate::{logger, Result};

#[derive(Parser, Debug)]
#[command(name = "mavgate")]
#[command(about = "MAVLink to gRPC bridge")]
#[command(version)]
struct Args {
    /// MAVLink connection URL: udp://:PORT, udp://HOST:PORT or
    /// serial://DEVICE:BAUD
    #[arg(short = 'c', long, default_value = "udp://:14550")]
    connection: String,

    /// Address the gRPC server listens on
    #[arg(short = 'g', long, default_value = "0.0.0.0:50051")]
    grpc: SocketAddr,

    /// MAVLink system id of the bridge
    #[arg(short = 's', long, default_value_t = 1)]
    system_id: u8,

    /// MAVLink component id of the bridge
    #[arg(short = 'C', long, default_value_t = 1)]
    component_id: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _logger = logger::init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    log::info!("mavgate starting");
    log::info!("  connection: {}", args.connection);
    log::info!("  gRPC address: {}", args.grpc);
    log::info!("  system id: {}", args.system_id);
    log::info!("  component id: {}", args.component_id);

    let bridge = Arc::new(Bridge::new(BridgeConf {
        connection_url: args.connection,
        grpc_addr: args.grpc,
        system_id: args.system_id,
        component_id: args.component_id,
    })?);

    bridge.start()?;

    let shutdown_bridge = bridge.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("received shutdown signal");
        shutdown_bridge.stop();
    });

    log::info!("bridge running, press Ctrl+C to stop");
    bridge.wait().await?;

    log::info!("bridge shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
