//! Per-API lookup of instances by name

use crate::{ResourceError, Result};
use arc_swap::ArcSwap;
use resource_api::{ApiId, Name};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Entries<S> = HashMap<Name, Arc<S>>;

/// ResourceCollection maps instance names to the instances of one API.
///
/// Readers always see a complete snapshot. Reconfiguration builds a new
/// map and swaps it in whole.
pub struct ResourceCollection<S: ?Sized> {
    api: ApiId,
    resources: ArcSwap<Entries<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> ResourceCollection<S> {
    /// Build a collection, rejecting duplicate names, invalid names and
    /// names that belong to another API
    pub fn new(api: ApiId, entries: Vec<(Name, Arc<S>)>) -> Result<Self> {
        let resources = Self::build(&api, entries)?;
        Ok(Self {
            api,
            resources: ArcSwap::from_pointee(resources),
        })
    }

    /// An empty collection for `api`
    pub fn empty(api: ApiId) -> Self {
        Self {
            api,
            resources: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    fn build(api: &ApiId, entries: Vec<(Name, Arc<S>)>) -> Result<Entries<S>> {
        let mut resources = HashMap::with_capacity(entries.len());
        for (name, resource) in entries {
            name.validate()?;
            if name.api() != api {
                return Err(ResourceError::WrongApi {
                    name,
                    api: api.clone(),
                });
            }
            if resources.contains_key(&name) {
                return Err(ResourceError::DuplicateName(name));
            }
            resources.insert(name, resource);
        }
        Ok(resources)
    }

    pub fn api(&self) -> &ApiId {
        &self.api
    }

    /// Resolve an instance by short name (`remote:name`) or by its
    /// fully-qualified form (`rdk:service:lerobot/remote:name`)
    pub fn resource(&self, name: &str) -> Result<Arc<S>> {
        let key = if name.contains('/') {
            match name.parse::<Name>() {
                Ok(parsed) => parsed,
                Err(_) => return Err(ResourceError::NotFound(name.to_string())),
            }
        } else {
            Name::new(self.api.clone(), name)
        };
        self.resource_by_name(&key)
    }

    pub fn resource_by_name(&self, name: &Name) -> Result<Arc<S>> {
        self.resources
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(name.short_name()))
    }

    /// Validate and atomically install a whole new set of instances
    pub fn replace(&self, entries: Vec<(Name, Arc<S>)>) -> Result<()> {
        let resources = Self::build(&self.api, entries)?;
        debug!(api = %self.api, count = resources.len(), "Replacing resource collection");
        self.resources.store(Arc::new(resources));
        Ok(())
    }

    /// Deregister one instance, returning it if it was present
    pub fn remove(&self, name: &Name) -> Option<Arc<S>> {
        let previous = self.resources.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(name);
            next
        });
        let removed = previous.get(name).cloned();
        if removed.is_some() {
            debug!(api = %self.api, name = %name, "Removed resource");
        }
        removed
    }

    /// Names in the current snapshot, sorted
    pub fn names(&self) -> Vec<Name> {
        let mut names: Vec<Name> = self.resources.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every instance in the current snapshot
    pub fn snapshot(&self) -> Vec<(Name, Arc<S>)> {
        self.resources
            .load()
            .iter()
            .map(|(name, resource)| (name.clone(), resource.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.load().is_empty()
    }
}
