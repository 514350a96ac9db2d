//! wkp-agent
//!
//! An in-cluster agent forwarding Kubernetes events and periodic cluster
//! snapshots to a remote collector.

mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{CliOverrides, ConfigLoader, get_agent_token};
use k8s_openapi::api::core::v1::Event;
use kube::Api;
use server::{build_router, run_server};
use shutdown::ShutdownSignals;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use wkp_agent_core::collectors::{ClusterInfoCollector, FluxInfoCollector};
use wkp_agent_core::informer::KubeInformer;
use wkp_agent_core::processors::{EventNotifier, EventSender, Poller, Watcher};
use wkp_agent_core::transport::HttpTransport;

/// wkp-agent - Kubernetes telemetry forwarder
#[derive(Parser, Debug)]
#[command(name = "wkp-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./wkp-agent.toml")]
    config: PathBuf,

    /// Override the collector endpoint
    #[arg(long, env = "WKP_AGENT_COLLECTOR_URL")]
    collector_url: Option<Url>,

    /// Override the health endpoint listen address (e.g., 0.0.0.0:8080)
    #[arg(long)]
    health_listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    tracing::info!("Starting wkp-agent v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(
        &args.config,
        CliOverrides {
            collector_url: args.collector_url,
            health_listen: args.health_listen,
        },
    );
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let token = get_agent_token().map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;

    let client = kube::Client::try_default().await.map_err(|e| {
        tracing::error!("Failed to create Kubernetes client: {}", e);
        e
    })?;

    let transport = HttpTransport::new(&config.transport)?;
    let sender = EventSender::new(config.source.clone(), Arc::new(transport));
    tracing::info!(collector = %config.transport.url, "Sending events to collector");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    ShutdownSignals::install()?.forward_to(Arc::clone(&shutdown_tx));

    let mut tasks = JoinSet::new();
    let mut poller_stats = Vec::new();

    if let Some(watcher_config) = config.events_watcher {
        let informer = KubeInformer::new(Api::<Event>::all(client.clone()));
        let watcher = Watcher::new(informer, EventNotifier::new(token.clone(), sender.clone()))
            .with_cache_sync_timeout(watcher_config.cache_sync_timeout)
            .with_max_retries(watcher_config.max_retries);
        let shutdown_rx = shutdown_rx.clone();
        tasks.spawn(async move {
            if let Err(e) = watcher
                .run("events", watcher_config.workers, shutdown_rx)
                .await
            {
                tracing::error!(error = %e, "Events watcher stopped");
            }
        });
    }

    if let Some(poller_config) = config.cluster_info {
        let collector = ClusterInfoCollector::new(token.clone(), client.clone());
        let poller = Poller::new(poller_config, collector, sender.clone());
        poller_stats.push((poller.name().to_string(), poller.stats()));
        tasks.spawn(poller.run(shutdown_rx.clone()));
    }

    if let Some(poller_config) = config.flux_info {
        let collector = FluxInfoCollector::new(token.clone(), client.clone());
        let poller = Poller::new(poller_config, collector, sender.clone());
        poller_stats.push((poller.name().to_string(), poller.stats()));
        tasks.spawn(poller.run(shutdown_rx.clone()));
    }

    let router = build_router(AppState::new(poller_stats));
    let result = run_server(router, config.health_listen, shutdown_rx).await;
    if let Err(e) = &result {
        tracing::error!("Health server failed: {}", e);
    }

    // Stop every component, whether the server exited on a signal or failed.
    let _ = shutdown_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Component task failed: {}", e);
        }
    }
    tracing::info!("wkp-agent shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
