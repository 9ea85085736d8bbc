use std::sync::Arc;

use microcks_devservice::devservice::{BackgroundTasks, ProjectLayout, RunningDevService};
use microcks_devservice::devui::card_page;
use microcks_devservice::docker::DockerRuntime;
use microcks_devservice::ipc::StatusServer;
use microcks_devservice::microcks::MicrocksClientFactory;
use microcks_devservice::{DevServiceManager, GlobalConfig, ManagedState, ShutdownHooks};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = GlobalConfig::load()?;
    let ctx = cfg.launch_context();
    tracing::info!("Microcks dev service manager starting ({:?} mode)", ctx.mode);

    let runtime = Arc::new(DockerRuntime::new());
    let hooks = Arc::new(ShutdownHooks::new());
    let manager = Arc::new(DevServiceManager::new(
        runtime.clone(),
        runtime,
        Arc::new(MicrocksClientFactory),
        ProjectLayout::new(cfg.resource_dirs.clone()),
        ManagedState::shared(),
        hooks.clone(),
    ));

    // A failed start leaves nothing to fall back to: exit with the error.
    let services = manager.ensure_running(&cfg.devservices, &ctx).await?;
    publish(&services);
    for page in card_page(&services, ctx.mode).pages {
        tracing::info!("{}: {}", page.title, page.url);
    }

    let mut tasks = BackgroundTasks::new();

    if let Some(addr) = &cfg.status_addr {
        let server = StatusServer::new(manager.clone(), ctx.mode, addr);
        tasks.spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!("Status API error: {}", e);
            }
        });
    }

    // Re-read the configuration periodically; a change restarts the service.
    if let Some(interval) = cfg.reload_interval() {
        let manager = manager.clone();
        tasks.spawn(async move {
            let mut current: Vec<String> = services.iter().map(|s| s.container_id.clone()).collect();
            loop {
                tokio::time::sleep(interval).await;

                let cfg = match GlobalConfig::load() {
                    Ok(cfg) => cfg,
                    Err(e) => {
                        tracing::warn!("Ignoring invalid configuration: {}", e);
                        continue;
                    }
                };
                match manager.ensure_running(&cfg.devservices, &cfg.launch_context()).await {
                    Ok(services) => {
                        let ids: Vec<String> = services.iter().map(|s| s.container_id.clone()).collect();
                        if ids != current {
                            publish(&services);
                            current = ids;
                        }
                    }
                    Err(e) => tracing::error!("{}", e),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Shutdown signal received, cleaning up...");
    tasks.shutdown(&hooks).await;

    tracing::info!("Microcks dev service manager stopped");
    Ok(())
}

/// Print the exported configuration as `key=value` lines.
fn publish(services: &[RunningDevService]) {
    if services.is_empty() {
        tracing::info!("No Microcks dev service running");
    }
    for service in services {
        for (key, value) in &service.config {
            println!("{}={}", key, value);
        }
    }
}
