//! A locator which uses a [registry] to find instances, and turns each
//! service's first instance into a [route::RouteDefinition].

#[cfg(feature = "probes")]
use crate::probes;
#[cfg(feature = "probes")]
use crate::LocateId;
use crate::policy::LocatorConfig;
use crate::registry::{self, SharedRegistry};
use crate::route::{self, RouteDefinition};

use futures::future;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::{event, instrument, Level};

/// Produces the current set of per-instance routes.
///
/// Nothing is cached: each call to [RouteLocator::route_definitions] asks the
/// registry again, so consecutive calls track registry membership.
pub struct RouteLocator {
    registry: SharedRegistry,
    config: LocatorConfig,
}

/// A wrapper type indicating that the USDT probes could not be registered.
///
/// In this case, no probes will be available in the process. However, similar
/// to `std::sync::PoisonError`, this contains the locator itself, which works
/// normally.
pub struct RegistrationError(RouteLocator);

impl std::fmt::Debug for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationError").finish_non_exhaustive()
    }
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        "USDT probe registration failed".fmt(f)
    }
}

impl std::error::Error for RegistrationError {}

impl RegistrationError {
    /// Consume the error and get access to the contained locator.
    pub fn into_inner(self) -> RouteLocator {
        self.0
    }
}

impl RouteLocator {
    /// Creates a new locator reading from `registry`.
    ///
    /// ```no_run
    /// use instgate::locator::RouteLocator;
    /// use instgate::policy::LocatorConfig;
    /// use instgate::registries::fixed::FixedRegistry;
    /// use std::sync::Arc;
    ///
    /// # async {
    /// let registry = Arc::new(FixedRegistry::default());
    /// let locator = RouteLocator::new(registry, LocatorConfig::default()).unwrap();
    /// let routes = locator.route_table().await.unwrap();
    /// # };
    /// ```
    ///
    /// # DTrace probe registration
    ///
    /// Registering USDT probes is fallible. The `Err` variant still carries
    /// the locator, so callers which don't care about instrumentation can
    /// recover it with [RegistrationError::into_inner].
    ///
    /// If the `"probes"` feature is not enabled, this method is infallible.
    #[instrument(skip(registry), name = "RouteLocator::new")]
    pub fn new(
        registry: SharedRegistry,
        config: LocatorConfig,
    ) -> Result<Self, RegistrationError> {
        let self_ = Self { registry, config };
        #[cfg(feature = "probes")]
        match usdt::register_probes() {
            Ok(_) => Ok(self_),
            Err(_) => Err(RegistrationError(self_)),
        }
        #[cfg(not(feature = "probes"))]
        Ok(self_)
    }

    /// Returns the routes for the registry as it is right now.
    ///
    /// The stream is lazy: the registry is not contacted until it is first
    /// polled. Routes come out in the order the registry listed the services.
    ///
    /// If the registry fails, the error is yielded once and the stream ends.
    /// Routes yielded before the error must not be taken as a complete table;
    /// [RouteLocator::route_table] takes care of that.
    ///
    /// Dropping the stream drops any in-flight registry calls.
    pub fn route_definitions(
        &self,
    ) -> BoxStream<'static, Result<RouteDefinition, registry::Error>> {
        let registry = self.registry.clone();
        let concurrency = self.config.max_concurrent_lookups.max(1);

        let routes = stream::once(async move {
            event!(Level::DEBUG, "Listing services");
            let services = registry.list_services().await?;
            event!(Level::DEBUG, count = services.len(), "Listed services");

            let lookups = stream::iter(services)
                .map(move |service| {
                    let registry = registry.clone();
                    async move {
                        let instances = registry.list_instances(&service).await?;
                        Ok::<_, registry::Error>((service, instances))
                    }
                })
                .buffered(concurrency);
            Ok::<_, registry::Error>(lookups)
        })
        .try_flatten()
        .try_filter_map(|(service, instances)| {
            let first = instances.into_iter().next();
            if first.is_none() {
                event!(Level::TRACE, %service, "Skipping service without instances");
            }
            future::ready(Ok(first))
        })
        .map_ok(|instance| route::synthesize(&instance))
        .boxed();

        // After an error, end without polling `routes` again: that would
        // wait on (or start) another registry lookup.
        stream::unfold((routes, false), |(mut routes, failed)| async move {
            if failed {
                return None;
            }
            let result = routes.next().await?;
            if let Err(err) = &result {
                event!(Level::ERROR, ?err, "Registry query failed");
            }
            let failed = result.is_err();
            Some((result, (routes, failed)))
        })
        .boxed()
    }

    /// Collects one complete set of routes.
    ///
    /// Fails as a whole if any registry call fails; no partial table is
    /// returned.
    #[instrument(level = "debug", skip(self), err, name = "RouteLocator::route_table")]
    pub async fn route_table(&self) -> Result<Vec<RouteDefinition>, registry::Error> {
        #[cfg(feature = "probes")]
        let id = LocateId::new();
        #[cfg(feature = "probes")]
        probes::locate__start!(|| id.0);
        let result = self.route_definitions().try_collect::<Vec<_>>().await;
        #[cfg(feature = "probes")]
        match &result {
            Ok(routes) => probes::locate__done!(|| (id.0, routes.len() as u64)),
            Err(err) => probes::locate__failed!(|| (id.0, err.as_str())),
        }
        if let Ok(routes) = &result {
            event!(Level::DEBUG, count = routes.len(), "Located routes");
        }
        result
    }
}
