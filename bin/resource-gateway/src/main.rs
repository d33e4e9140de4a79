use anyhow::{Context, Result};
use resource_core::registry;
use resource_rpc::{
    InterceptorChain, LoggingInterceptor, MetricsCollector, MetricsInterceptor, RpcServer,
    TraceInterceptor,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod admin;
mod config;
mod manager;

use config::{GatewayConfig, LogConfig};
use manager::{register_all_apis, ResourceManager};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::load()?;
    init_logging(&config.log);

    info!("Starting resource-gateway...");

    register_all_apis(registry::global())?;
    info!("Registered APIs: {:?}", registry::global().apis());

    let metrics_collector = MetricsCollector::new().context("Failed to create metrics collector")?;

    let interceptors = InterceptorChain::new()
        .add(TraceInterceptor::with_service_name(env!("CARGO_PKG_NAME")))
        .add(LoggingInterceptor)
        .add(MetricsInterceptor::new(metrics_collector.clone()));
    info!("Interceptor chain initialized with {} interceptors", interceptors.len());

    let server = Arc::new(RpcServer::with_interceptors(interceptors));

    let mut manager = ResourceManager::new(registry::global())?;
    manager.apply(&config).await?;
    manager.register_services(&server)?;
    info!("Services mounted: {:?}", server.service_names());

    let shutdown = CancellationToken::new();

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!("RPC endpoint listening on http://{}", listener.local_addr()?);
    let server_task = tokio::spawn(server.clone().serve(listener, shutdown.clone()));

    let admin_task = match &config.admin_listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind admin endpoint {}", addr))?;
            Some(tokio::spawn(admin::serve(
                listener,
                metrics_collector.clone(),
                shutdown.clone(),
            )))
        }
        None => None,
    };

    let mut reload = ReloadSignal::new()?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Shutdown signal received");
                break;
            }
            _ = reload.recv() => {
                info!("Reload signal received, re-reading configuration");
                match GatewayConfig::load() {
                    Ok(next) => {
                        if next.listen != config.listen || next.admin_listen != config.admin_listen {
                            warn!("Listen address changes take effect on restart");
                        }
                        if let Err(e) = manager.apply(&next).await {
                            warn!("Reload failed, keeping previous resources: {:#}", e);
                        }
                    }
                    Err(e) => warn!("Reload failed, keeping previous resources: {:#}", e),
                }
            }
        }
    }

    shutdown.cancel();
    match server_task.await {
        Ok(Err(e)) => error!("RPC endpoint failed: {}", e),
        Err(e) => error!("RPC endpoint task panicked: {}", e),
        Ok(Ok(())) => {}
    }
    if let Some(task) = admin_task {
        if let Err(e) = task.await {
            error!("Admin endpoint task panicked: {}", e);
        }
    }
    manager.close_all().await;

    info!("resource-gateway stopped");
    Ok(())
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    if log.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// SIGHUP on unix; never fires elsewhere
struct ReloadSignal {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        Ok(Self { hangup })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.hangup.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
