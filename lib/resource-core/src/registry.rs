//! Process-wide registry of capability contracts

use crate::{ResourceCollection, ResourceError, Result};
use arc_swap::ArcSwap;
use resource_api::{ApiId, Name};
use resource_rpc::{ClientConn, RpcServer, RpcService, ServerError, ServiceDescriptor};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::info;

/// How to serve and how to reach one capability contract.
///
/// `S` is the contract's trait object type, e.g. `dyn LeRobot`.
pub struct ApiRegistration<S: ?Sized> {
    /// Wire descriptor of the dispatcher
    pub descriptor: &'static ServiceDescriptor,
    /// Builds the dispatcher over a collection
    pub server: fn(Arc<ResourceCollection<S>>) -> Arc<dyn RpcService>,
    /// Builds a client proxy: connection, remote prefix, target name
    pub client: fn(ClientConn, &str, Name) -> Arc<S>,
}

impl<S: ?Sized> Clone for ApiRegistration<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for ApiRegistration<S> {}

impl<S: ?Sized + Send + Sync + 'static> ApiRegistration<S> {
    /// Mount the dispatcher for `collection` on the shared endpoint
    pub fn register_rpc_service(
        &self,
        server: &RpcServer,
        collection: Arc<ResourceCollection<S>>,
    ) -> std::result::Result<(), ServerError> {
        server.register_service((self.server)(collection))
    }

    /// A proxy for `name` reached through `conn`, qualified with `remote`
    pub fn new_client(&self, conn: ClientConn, remote: &str, name: Name) -> Arc<S> {
        (self.client)(conn, remote, name)
    }
}

type Registrations = HashMap<ApiId, Arc<dyn Any + Send + Sync>>;

/// ApiRegistry maps API identifiers to their registrations.
///
/// Writes are serialized and happen at startup; lookups read a snapshot
/// and are safe at any time.
pub struct ApiRegistry {
    write_lock: Mutex<()>,
    registrations: ArcSwap<Registrations>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            registrations: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Register a contract. Each API may be registered exactly once.
    pub fn register<S: ?Sized + 'static>(
        &self,
        api: ApiId,
        registration: ApiRegistration<S>,
    ) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = self.registrations.load();
        if current.contains_key(&api) {
            return Err(ResourceError::DuplicateApi(api));
        }
        let mut next = (**current).clone();
        next.insert(api.clone(), Arc::new(registration));
        self.registrations.store(Arc::new(next));

        info!("Registered API {} ({})", api, registration.descriptor.name);
        Ok(())
    }

    /// Find the registration for `api`.
    ///
    /// `Ok(None)` when nothing is registered; an error when the API was
    /// registered for a different contract type than `S`.
    pub fn lookup<S: ?Sized + 'static>(&self, api: &ApiId) -> Result<Option<ApiRegistration<S>>> {
        let registrations = self.registrations.load();
        let Some(entry) = registrations.get(api) else {
            return Ok(None);
        };
        entry
            .downcast_ref::<ApiRegistration<S>>()
            .copied()
            .map(Some)
            .ok_or_else(|| ResourceError::ApiTypeMismatch(api.clone()))
    }

    /// Registered identifiers, sorted
    pub fn apis(&self) -> Vec<ApiId> {
        let mut apis: Vec<ApiId> = self.registrations.load().keys().cloned().collect();
        apis.sort();
        apis
    }
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry shared by the whole process
pub fn global() -> &'static ApiRegistry {
    static GLOBAL: OnceLock<ApiRegistry> = OnceLock::new();
    GLOBAL.get_or_init(ApiRegistry::new)
}
