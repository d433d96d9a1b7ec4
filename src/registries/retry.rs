//! A [Registry] wrapper which retries failed calls.
//!
//! Registries are not expected to retry on their own; wrap one in a
//! [RetryingRegistry] to opt into timeouts and retries with backoff.

use crate::backoff::ExponentialBackoff;
use crate::instance::Instance;
use crate::policy::RetryPolicy;
use crate::registry::{self, Registry, SharedRegistry};
use crate::service;

use async_trait::async_trait;
use std::future::Future;
use tokio::time::timeout;
use tracing::{event, Level};

pub struct RetryingRegistry {
    inner: SharedRegistry,
    policy: RetryPolicy,
}

impl RetryingRegistry {
    pub fn new(inner: SharedRegistry, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    // Runs "f" against the inner registry until it succeeds, or until the
    // policy runs out of attempts.
    async fn call<'a, T, F, Fut>(
        &'a self,
        op: &'static str,
        mut f: F,
    ) -> Result<T, registry::Error>
    where
        F: FnMut(&'a dyn Registry) -> Fut,
        Fut: Future<Output = Result<T, registry::Error>>,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.initial_backoff;
        let mut attempt = 1;
        loop {
            let result = timeout(self.policy.attempt_timeout, f(self.inner.as_ref())).await;
            let err = match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => registry::Error::Timeout,
            };

            if attempt >= attempts {
                event!(Level::ERROR, op, attempt, ?err, "Registry call failed, giving up");
                return Err(err);
            }
            event!(Level::WARN, op, attempt, ?err, "Registry call failed, retrying");

            tokio::time::sleep(delay.add_spread(self.policy.spread)).await;
            delay = delay.exponential_backoff(self.policy.max_backoff);
            attempt += 1;
        }
    }
}

#[async_trait]
impl Registry for RetryingRegistry {
    async fn list_services(&self) -> Result<Vec<service::Name>, registry::Error> {
        self.call("list_services", |registry| registry.list_services())
            .await
    }

    async fn list_instances(
        &self,
        service: &service::Name,
    ) -> Result<Vec<Instance>, registry::Error> {
        self.call("list_instances", |registry| registry.list_instances(service))
            .await
    }
}
