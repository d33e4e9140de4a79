//! Builds and reconfigures the collections served by the gateway

use crate::config::{GatewayConfig, RemoteConfig, ResourceConfig};
use anyhow::{anyhow, bail, Context, Result};
use resource_api::Name;
use resource_core::{ApiRegistration, ApiRegistry, ResourceCollection};
use resource_rpc::{CallContext, ClientConn, RpcServer};
use service_lerobot::{FakeLeRobot, LeRobot};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Register every API this binary knows about. Must run once, before
/// any collection is built.
pub fn register_all_apis(registry: &ApiRegistry) -> Result<()> {
    service_lerobot::register(registry).context("Failed to register LeRobot API")?;
    Ok(())
}

struct Remote {
    address: String,
    conn: ClientConn,
}

/// ResourceManager owns the collections, the local instances and the
/// connections to remote systems.
pub struct ResourceManager {
    lerobot: ApiRegistration<dyn LeRobot>,
    lerobots: Arc<ResourceCollection<dyn LeRobot>>,
    /// Configuration each local instance was built from
    local: HashMap<Name, ResourceConfig>,
    remotes: HashMap<String, Remote>,
}

impl ResourceManager {
    pub fn new(registry: &ApiRegistry) -> Result<Self> {
        let api = service_lerobot::api();
        let lerobot = registry
            .lookup::<dyn LeRobot>(&api)?
            .ok_or_else(|| anyhow!("API {} is not registered", api))?;
        Ok(Self {
            lerobot,
            lerobots: Arc::new(ResourceCollection::empty(api)),
            local: HashMap::new(),
            remotes: HashMap::new(),
        })
    }

    pub fn lerobots(&self) -> &Arc<ResourceCollection<dyn LeRobot>> {
        &self.lerobots
    }

    /// Mount one dispatcher per API on the endpoint
    pub fn register_services(&self, server: &RpcServer) -> Result<()> {
        self.lerobot
            .register_rpc_service(server, self.lerobots.clone())?;
        Ok(())
    }

    /// Bring the collections in line with `config`.
    ///
    /// Unchanged local instances are kept. Nothing is swapped unless the
    /// whole new set builds; replaced instances are closed afterwards.
    pub async fn apply(&mut self, config: &GatewayConfig) -> Result<()> {
        let remotes = self.connect_remotes(&config.remotes).await?;

        let previous: HashMap<Name, Arc<dyn LeRobot>> =
            self.lerobots.snapshot().into_iter().collect();
        let mut local = HashMap::new();
        let mut entries = Vec::new();

        for resource in config
            .resources
            .iter()
            .filter(|r| &r.api == self.lerobots.api())
        {
            let name = resource.resource_name();
            let instance = match (self.local.get(&name), previous.get(&name)) {
                (Some(built_from), Some(existing)) if built_from == resource => existing.clone(),
                _ => build_lerobot(resource)?,
            };
            local.insert(name.clone(), resource.clone());
            entries.push((name, instance));
        }

        for remote in &config.remotes {
            let conn = &remotes
                .get(&remote.name)
                .ok_or_else(|| anyhow!("Remote {} is not connected", remote.name))?
                .conn;
            for name in remote
                .resources
                .iter()
                .filter(|n| n.api() == self.lerobots.api())
            {
                let proxy = self.lerobot.new_client(conn.clone(), &remote.name, name.clone());
                entries.push((proxy.name(), proxy));
            }
        }

        self.lerobots
            .replace(entries)
            .context("Failed to build LeRobot collection")?;
        self.local = local;

        let ctx = CallContext::background();
        for (name, old) in previous {
            let kept = self
                .lerobots
                .resource_by_name(&name)
                .map(|current| Arc::ptr_eq(&current, &old))
                .unwrap_or(false);
            if !kept {
                if let Err(e) = old.close(&ctx).await {
                    warn!("Error closing {}: {:#}", name, e);
                }
            }
        }

        let stale = std::mem::replace(&mut self.remotes, remotes);
        for (name, remote) in stale {
            let reused = self
                .remotes
                .get(&name)
                .is_some_and(|current| current.address == remote.address);
            if !reused {
                info!("Closing connection to remote {} ({})", name, remote.address);
                remote.conn.close();
            }
        }

        info!(
            "Serving {} LeRobot resources: {:?}",
            self.lerobots.len(),
            self.lerobots
                .names()
                .iter()
                .map(|n| n.short_name())
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Reuse live connections whose address is unchanged, dial the rest
    async fn connect_remotes(&self, configs: &[RemoteConfig]) -> Result<HashMap<String, Remote>> {
        let mut remotes = HashMap::new();
        for config in configs {
            if let Some(existing) = self.remotes.get(&config.name) {
                if existing.address == config.address && !existing.conn.is_closed() {
                    debug!("Reusing connection to remote {}", config.name);
                    remotes.insert(
                        config.name.clone(),
                        Remote {
                            address: existing.address.clone(),
                            conn: existing.conn.clone(),
                        },
                    );
                    continue;
                }
            }

            let ctx = CallContext::background()
                .with_timeout(Duration::from_millis(config.connect_timeout_ms));
            let conn = ClientConn::dial(&ctx, &config.address)
                .await
                .with_context(|| format!("Failed to dial remote {} at {}", config.name, config.address))?;
            info!("Connected to remote {} at {}", config.name, config.address);
            remotes.insert(
                config.name.clone(),
                Remote {
                    address: config.address.clone(),
                    conn,
                },
            );
        }
        Ok(remotes)
    }

    /// Close every instance and every remote connection
    pub async fn close_all(&mut self) {
        let ctx = CallContext::background();
        for (name, resource) in self.lerobots.snapshot() {
            if let Err(e) = resource.close(&ctx).await {
                warn!("Error closing {}: {:#}", name, e);
            }
        }
        for (name, remote) in self.remotes.drain() {
            debug!("Closing connection to remote {}", name);
            remote.conn.close();
        }
    }
}

fn build_lerobot(config: &ResourceConfig) -> Result<Arc<dyn LeRobot>> {
    match config.model.as_str() {
        "fake" => {
            info!("Building fake LeRobot {}", config.name);
            Ok(Arc::new(FakeLeRobot::new(&config.name, &config.attributes)))
        }
        other => bail!("Unknown LeRobot model {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_api::Extra;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    fn registry() -> ApiRegistry {
        let registry = ApiRegistry::new();
        register_all_apis(&registry).unwrap();
        registry
    }

    fn config(yaml: &str) -> GatewayConfig {
        let config = GatewayConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn test_register_all_apis_once() {
        let registry = registry();
        assert_eq!(registry.apis(), vec![service_lerobot::api()]);
        assert!(register_all_apis(&registry).is_err());
    }

    #[tokio::test]
    async fn test_apply_builds_local_resources() {
        let mut manager = ResourceManager::new(&registry()).unwrap();
        manager
            .apply(&config("resources:\n  - {name: lerobot1, model: fake}\n  - {name: lerobot2, model: fake}\n"))
            .await
            .unwrap();

        assert_eq!(
            manager.lerobots().names(),
            vec![service_lerobot::named("lerobot1"), service_lerobot::named("lerobot2")]
        );
    }

    #[tokio::test]
    async fn test_reapply_keeps_unchanged_instances() {
        let mut manager = ResourceManager::new(&registry()).unwrap();
        let first = config("resources:\n  - {name: lerobot1, model: fake}\n  - {name: lerobot2, model: fake}\n");
        manager.apply(&first).await.unwrap();
        let kept = manager.lerobots().resource("lerobot1").unwrap();
        let changed = manager.lerobots().resource("lerobot2").unwrap();

        let ctx = CallContext::background();
        let session_id = kept
            .start_recording(&ctx, "d", Extra::new())
            .await
            .unwrap();

        let second = config(
            "resources:\n  - {name: lerobot1, model: fake}\n  - {name: lerobot2, model: fake, attributes: {policy_type: diffusion}}\n",
        );
        manager.apply(&second).await.unwrap();

        assert!(Arc::ptr_eq(&kept, &manager.lerobots().resource("lerobot1").unwrap()));
        assert!(!Arc::ptr_eq(&changed, &manager.lerobots().resource("lerobot2").unwrap()));
        // the kept instance still knows its session
        kept.stop_recording(&ctx, &session_id, Extra::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_removed_resource_is_closed_and_gone() {
        let mut manager = ResourceManager::new(&registry()).unwrap();
        manager
            .apply(&config("resources:\n  - {name: lerobot1, model: fake}\n"))
            .await
            .unwrap();
        let old = manager.lerobots().resource("lerobot1").unwrap();
        let ctx = CallContext::background();
        let session_id = old.start_recording(&ctx, "d", Extra::new()).await.unwrap();

        manager.apply(&config("{}")).await.unwrap();
        assert!(matches!(manager.lerobots().resource("lerobot1"), Err(e) if e.is_not_found()));
        // closing dropped the open session
        assert!(old.stop_recording(&ctx, &session_id, Extra::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_remote_resources_are_proxied() {
        // a second gateway hosting lerobot1
        let registry = registry();
        let mut far = ResourceManager::new(&registry).unwrap();
        far.apply(&config("resources:\n  - {name: lerobot1, model: fake}\n"))
            .await
            .unwrap();
        let server = Arc::new(RpcServer::new());
        far.register_services(&server).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.serve(listener, shutdown.clone()));

        let mut near = ResourceManager::new(&registry).unwrap();
        near.apply(&config(&format!(
            "remotes:\n  - name: lab\n    address: \"{}\"\n    resources: [\"rdk:service:lerobot/lerobot1\"]\n",
            addr
        )))
        .await
        .unwrap();

        let proxy = near.lerobots().resource("lab:lerobot1").unwrap();
        let ctx = CallContext::background();
        let session_id = proxy.start_recording(&ctx, "d", Extra::new()).await.unwrap();

        // the session lives on the far side
        let local = far.lerobots().resource("lerobot1").unwrap();
        local.stop_recording(&ctx, &session_id, Extra::new()).await.unwrap();

        near.close_all().await;
        assert!(proxy.start_recording(&ctx, "d", Extra::new()).await.is_err());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unreachable_remote_fails_apply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut manager = ResourceManager::new(&registry()).unwrap();
        manager
            .apply(&config("resources:\n  - {name: lerobot1, model: fake}\n"))
            .await
            .unwrap();

        let broken = config(&format!(
            "resources:\n  - {{name: lerobot1, model: fake}}\nremotes:\n  - {{name: lab, address: \"{}\", connect_timeout_ms: 500}}\n",
            addr
        ));
        assert!(manager.apply(&broken).await.is_err());
        // the previous collection is still served
        assert!(manager.lerobots().resource("lerobot1").is_ok());
    }
}
