use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use cluster_proxy::admin::{self, AdminState};
use cluster_proxy::cluster::HealthChecker;
use cluster_proxy::config::{load_config, watcher::ConfigWatcher, ProxyConfig};
use cluster_proxy::lifecycle::{build_context, wait_for_signal, Shutdown};
use cluster_proxy::observability::{logging, metrics};
use cluster_proxy::proxy::Endpoint;

#[derive(Parser)]
#[command(name = "cluster-proxy")]
#[command(about = "Cluster-aware HTTP/1.x reverse proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = config.runtime.worker_threads {
        runtime.worker_threads(workers);
    }
    let runtime = runtime.build()?;

    runtime.block_on(run(config, args.config))
}

async fn run(config: ProxyConfig, config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cluster-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let ctx = build_context(&config)?;
    let shutdown = Shutdown::new();

    let health = HealthChecker::new(Arc::clone(&ctx.registry), &config.health_check);
    let health_task = tokio::spawn(health.run(shutdown.subscribe()));

    // Node list hot reload. The watcher handle must outlive the loop.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(&path);
            let handle = watcher.run()?;
            let ctx = Arc::clone(&ctx);
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => match update {
                            Some(new_config) => {
                                ctx.reconcile(&new_config.balancers, &new_config.nodes);
                                tracing::info!(nodes = ctx.registry.nodes().len(), "Node list reloaded");
                            }
                            None => break,
                        },
                        _ = stop.recv() => break,
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    let endpoint = Endpoint::bind(&config.listener, Arc::clone(&ctx)).await?;
    let control = endpoint.control();

    if config.admin.enabled {
        let addr = config.admin.bind_address.parse()?;
        let state = AdminState {
            ctx: Arc::clone(&ctx),
            endpoint: control.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        tokio::spawn(admin::serve(addr, state, shutdown.subscribe()));
    }

    let signal_shutdown = shutdown.clone();
    let signal_control = control.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_control.stop();
        signal_shutdown.trigger("signal");
    });

    // Returns after stop (signal or admin API) once connections drained.
    endpoint.run(shutdown.subscribe()).await;

    shutdown.trigger("endpoint stopped");
    let _ = health_task.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
