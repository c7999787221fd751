use anyhow::Context;
use clap::Parser;
use routeflow_config::{Config, find_config_file};
use routeflow_controller::{Controller, ReconcilerSettings};
use routeflow_kube::IngressWatcher;
use routeflow_openstack::{Endpoints, OpenStackCloud};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "routeflowd")]
#[command(about = "Reconciles Kubernetes ingresses onto OpenStack load balancers", version)]
struct Cli {
    /// Config file; searched in the usual locations when omitted
    #[arg(short, long, env = "ROUTEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let config =
        Config::load(&path).with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        config = %path.display(),
        cluster = %config.cluster_name,
        class = %config.ingress_class,
        "Configuration loaded"
    );

    if cli.check {
        println!("{}: ok", path.display());
        return Ok(());
    }

    let cloud = OpenStackCloud::new(
        Endpoints {
            loadbalancer: config.openstack.loadbalancer_endpoint.clone(),
            network: config.openstack.network_endpoint.clone(),
            key_manager: config.openstack.key_manager_endpoint.clone(),
        },
        config.openstack.resolve_token()?,
    )?;
    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let controller = Arc::new(Controller::new(
        Arc::new(cloud),
        routeflow_kube::collaborators(client.clone()),
        ReconcilerSettings::from(&config.openstack),
        &config.controller,
    ));
    let watcher = IngressWatcher::new(client, &config, controller.sender());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watch_task = tokio::spawn(watcher.run());
    let mut run_task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    let outcome = tokio::select! {
        result = &mut run_task => result,
        _ = shutdown_signal() => {
            info!("Shutdown requested, finishing in-flight work");
            let _ = shutdown_tx.send(true);
            run_task.await
        }
    };
    watch_task.abort();

    outcome.context("controller task panicked")??;
    info!("routeflowd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
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
}
