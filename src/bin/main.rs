//! mc-router-dns-manager binary entry point.

use clap::Parser;
use mc_router_dns_manager::dns::dnspod::DnsPodClient;
use mc_router_dns_manager::dns::huawei::HuaweiDnsClient;
use mc_router_dns_manager::router::McRouterClient;
use mc_router_dns_manager::sources::{DockerWatcherClient, NatmapClient};
use mc_router_dns_manager::{
    telemetry, AddressSource, ChangeFeed, Config, DnsProvider, DnsProviderConfig, Local,
    ManagerError, Monitorer, Remote,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Keeps mc-router routes and DNS records in sync with running game servers.
#[derive(Parser, Debug)]
#[command(name = "mc-router-dns-manager")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "mrdm.toml")]
    config: PathBuf,
}

fn build_provider(config: &DnsProviderConfig) -> Result<Arc<dyn DnsProvider>, ManagerError> {
    let provider: Arc<dyn DnsProvider> = match config {
        DnsProviderConfig::Dnspod(c) => Arc::new(DnsPodClient::new(c)?),
        DnsProviderConfig::Huawei(c) => Arc::new(HuaweiDnsClient::new(c)?),
    };
    Ok(provider)
}

fn build_monitor(config: &Config) -> Result<Monitorer, ManagerError> {
    let provider = build_provider(&config.dns)?;
    let router = Arc::new(McRouterClient::new(&config.router.base_url)?);
    let watcher = Arc::new(DockerWatcherClient::new(&config.docker_watcher.base_url)?);

    let mut feeds: Vec<Arc<dyn ChangeFeed>> = vec![watcher.clone() as Arc<dyn ChangeFeed>];
    let natmap: Option<Arc<dyn AddressSource>> = if config.natmap_monitor.enabled {
        let client = Arc::new(NatmapClient::new(
            &config.natmap_monitor.base_url,
            config.natmap_ports(),
        )?);
        feeds.push(client.clone());
        Some(client as Arc<dyn AddressSource>)
    } else {
        None
    };

    let local = Local::new(watcher, natmap, config.manual_addresses());
    let remote = Remote::new(provider, router, &config.managed_sub_domain, config.dns_ttl);
    Ok(Monitorer::new(local, remote, feeds, config.monitor.clone()))
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        domain = %config.dns.domain(),
        managed_sub_domain = %config.managed_sub_domain,
        router = %config.router.base_url,
        natmap = config.natmap_monitor.enabled,
        "Starting mc-router-dns-manager"
    );

    let monitor = Arc::new(build_monitor(&config)?);

    // Setup graceful shutdown
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    monitor.run(cancel).await;

    info!("mc-router-dns-manager shutdown complete");
    Ok(())
}
