//! instgate turns a service registry into per-instance gateway routes.
//!
//! Rather than load-balancing across the instances of a service, every
//! route points at a single instance, so that each instance is addressable
//! on its own below a stable path:
//!
//! ```text
//! GET /gateway/{service}/{instance}/{rest...}
//! ```
//!
//! is forwarded to `/{rest...}` on that instance.
//!
//! It uses the following terminology:
//! * Services are named entities providing the same interface.
//! * Instances are specific running replicas of a service, each with its own
//!   base URI.
//! * Route definitions describe how to recognize and forward requests for
//!   one instance: a path predicate, a path rewrite, and a target.
//!
//! # Usage
//!
//! * The main interface for this crate is [locator::RouteLocator].
//! * To construct a locator, you must supply a [registry::Registry], which
//!   specifies how to find services and their instances.
//! * The locator hands out [route::RouteDefinition]s. A proxy turns those
//!   into something it can match requests against, e.g. with
//!   [table::RouteTable].
//!
//! The locator never caches: every query asks the registry again, so routes
//! follow registry membership. Registries do not retry either; wrap one in
//! [registries::retry::RetryingRegistry] to opt into that.
//!
//! # DTrace probes
//!
//! instgate contains a number of DTrace USDT probes:
//!
//! - `locate-start`: Fires before querying the registry for a route table.
//! - `locate-done`: Fires after a route table was collected, with the number
//!   of routes.
//! - `locate-failed`: Fires when collecting a route table fails.
//! - `route-synthesized`: Fires for every route synthesized from an instance.
//!
//! The existence of the probes is behind the `"probes"` feature, which is
//! enabled by default. Probes are zero-cost unless they are explicitly enabled,
//! by tracing the program with the `dtrace(1)` command-line tool.
//!
//! Registering the probes is technically fallible, so
//! [locator::RouteLocator::new] returns a `Result` whose `Err` variant still
//! gives access to the locator.

// Public API
pub mod instance;
pub mod locator;
pub mod policy;
pub mod registry;
pub mod route;
pub mod service;
pub mod table;

// Necessary for implementation
mod backoff;
#[cfg(test)]
mod test_utils;

// Default implementations of generic interfaces
pub mod registries;

/// Identifies one collection of a route table
#[cfg(feature = "probes")]
#[derive(Copy, Clone, Debug)]
pub(crate) struct LocateId(pub u64);

#[cfg(feature = "probes")]
impl LocateId {
    fn new() -> Self {
        let id = usdt::UniqueId::new().as_u64();
        Self(id)
    }
}

/// USDT probes for tracing how instgate builds routes.
#[cfg(feature = "probes")]
#[usdt::provider(provider = "instgate")]
mod probes {
    /// Fires right before asking the registry for a route table.
    fn locate__start(locate_id: u64) {}

    /// Fires when a complete route table was collected.
    fn locate__done(locate_id: u64, routes: u64) {}

    /// Fires when the registry failed while collecting a route table, with a
    /// string identifying the reason.
    fn locate__failed(locate_id: u64, reason: &str) {}

    /// Fires when a route is synthesized for an instance, with the route id
    /// and the instance URI.
    fn route__synthesized(id: &str, target: &str) {}
}
