//! Implementation of [Registry] backed by an in-memory snapshot.

use tokio::sync::watch;

use crate::instance::Instance;
use crate::registry::{self, Registry};
use crate::service;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every known service, with its instances.
pub type AllServices = Arc<BTreeMap<service::Name, Vec<Instance>>>;

/// A [`Registry`] which reports whatever it was last given.
///
/// Services are listed in name order. Membership can be replaced at any
/// time, and subscribers are told when it changes.
#[derive(Clone, Debug)]
pub struct FixedRegistry {
    tx: watch::Sender<AllServices>,
}

impl Default for FixedRegistry {
    fn default() -> Self {
        Self::new([])
    }
}

impl FixedRegistry {
    pub fn new(services: impl IntoIterator<Item = (service::Name, Vec<Instance>)>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(services.into_iter().collect()));
        Self { tx }
    }

    /// Replaces every service at once.
    pub fn replace(&self, services: BTreeMap<service::Name, Vec<Instance>>) {
        self.tx.send_replace(Arc::new(services));
    }

    /// Sets the instances of one service, adding it if needed.
    pub fn insert(&self, service: service::Name, instances: Vec<Instance>) {
        self.tx.send_modify(|services| {
            Arc::make_mut(services).insert(service, instances);
        });
    }

    /// Forgets a service entirely.
    pub fn remove(&self, service: &service::Name) {
        self.tx.send_if_modified(|services| {
            if !services.contains_key(service) {
                return false;
            }
            Arc::make_mut(services).remove(service);
            true
        });
    }

    /// Returns a receiver which observes membership changes.
    pub fn subscribe(&self) -> watch::Receiver<AllServices> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Registry for FixedRegistry {
    async fn list_services(&self) -> Result<Vec<service::Name>, registry::Error> {
        Ok(self.tx.borrow().keys().cloned().collect())
    }

    async fn list_instances(
        &self,
        service: &service::Name,
    ) -> Result<Vec<Instance>, registry::Error> {
        Ok(self.tx.borrow().get(service).cloned().unwrap_or_default())
    }
}
