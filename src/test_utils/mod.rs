//! Utilities to help with testing instgate

use crate::instance::Instance;
use crate::registry::{self, Registry};
use crate::service;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// A test-only registry which keeps services in insertion order, and which
/// can be told to fail or to slow down.
pub struct FakeRegistry {
    services: Mutex<Vec<(service::Name, Vec<Instance>)>>,
    delays: Mutex<HashMap<service::Name, Duration>>,
    fail_list_services: AtomicBool,
    fail_list_instances_of: Mutex<Option<service::Name>>,
    // Pending failures of "list_services", consumed one per call
    transient_failures: AtomicUsize,

    list_services_calls: AtomicUsize,
    list_instances_calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self {
            services: Mutex::new(vec![]),
            delays: Mutex::new(HashMap::new()),
            fail_list_services: AtomicBool::new(false),
            fail_list_instances_of: Mutex::new(None),
            transient_failures: AtomicUsize::new(0),
            list_services_calls: AtomicUsize::new(0),
            list_instances_calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the instances of a service, keeping its position if it already
    /// exists.
    pub fn set_service(&self, name: &str, instances: Vec<Instance>) {
        let mut services = self.services.lock().unwrap();
        match services.iter_mut().find(|(n, _)| n.as_str() == name) {
            Some((_, existing)) => *existing = instances,
            None => services.push((service::Name::new(name), instances)),
        }
    }

    /// Makes "list_instances" for a service take `delay`.
    pub fn set_delay(&self, name: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(service::Name::new(name), delay);
    }

    pub fn fail_list_services(&self, fail: bool) {
        self.fail_list_services.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `count` calls to "list_services", then recovers.
    pub fn fail_list_services_times(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_list_instances_of(&self, name: Option<&str>) {
        *self.fail_list_instances_of.lock().unwrap() = name.map(service::Name::new);
    }

    pub fn list_services_calls(&self) -> usize {
        self.list_services_calls.load(Ordering::SeqCst)
    }

    pub fn list_instances_calls(&self) -> usize {
        self.list_instances_calls.load(Ordering::SeqCst)
    }

    /// The number of "list_instances" calls which have started, but have
    /// neither finished nor been dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn list_services(&self) -> Result<Vec<service::Name>, registry::Error> {
        self.list_services_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_services.load(Ordering::SeqCst) {
            return Err(registry::Error::Unavailable("injected failure".to_string()));
        }
        let transient = self.transient_failures.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |n| n.checked_sub(1),
        );
        if transient.is_ok() {
            return Err(registry::Error::Unavailable("transient failure".to_string()));
        }
        let services = self.services.lock().unwrap();
        Ok(services.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_instances(
        &self,
        service: &service::Name,
    ) -> Result<Vec<Instance>, registry::Error> {
        self.list_instances_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::new(&self.in_flight);

        let delay = self.delays.lock().unwrap().get(service).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_list_instances_of.lock().unwrap().as_ref() == Some(service) {
            return Err(registry::Error::Unavailable(format!(
                "injected failure for {service}"
            )));
        }
        let services = self.services.lock().unwrap();
        Ok(services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, instances)| instances.clone())
            .unwrap_or_default())
    }
}
