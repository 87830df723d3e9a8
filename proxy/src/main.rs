use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use proxy::config::ProxyConfig;
use proxy::context::ServerContext;
use proxy::session_manager::SessionManager;
use proxy::transport::{EventListener, ProxyEventListener};
use tokio::time::interval;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to a JSON config file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Server IP address to bind to (overrides the config file)
    #[clap(short = 'H', long)]
    host: Option<String>,
    /// Server port to listen on (overrides the config file)
    #[clap(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ProxyConfig::load(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(host) = args.host {
        config.server_ip = host;
    }
    if let Some(port) = args.port {
        config.server_port = port;
    }

    let max_threads = std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1);

    let context = Arc::new(ServerContext::new(&config));
    let manager = Arc::new(SessionManager::new(max_threads));
    let listener = ProxyEventListener::new(Arc::clone(&context), Arc::clone(&manager));

    let bind_addr = format!("{}:{}", config.server_ip, config.server_port);
    let advert = listener.on_query(bind_addr.parse().unwrap_or_else(|e| {
        error!("invalid bind address {}: {}", bind_addr, e);
        std::process::exit(1);
    }));
    info!(
        "{} ({} protocol {}) listening on {} with server id {}, {} tick workers max",
        advert.server_name,
        advert.game_tag,
        advert.protocol_version,
        bind_addr,
        context.server_id,
        max_threads
    );

    let mut tick = interval(Duration::from_millis(config.tick_interval_ms));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                manager.on_tick();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    manager.shutdown();
    Ok(())
}
