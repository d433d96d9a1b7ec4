//! Configuration options which can alter the behavior of the locator and
//! of the registries shipped with this crate.

use std::net::SocketAddr;
use std::time::Duration;

use crate::service;

/// Configuration for a [crate::locator::RouteLocator].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LocatorConfig {
    /// How many services may have their instances looked up at once.
    ///
    /// A value of one looks services up one after the other. Zero is
    /// treated as one.
    pub max_concurrent_lookups: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 16,
        }
    }
}

/// Resilience policy for a [crate::registries::retry::RetryingRegistry].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Total number of attempts per registry call, including the first.
    pub max_attempts: usize,

    /// How long a single attempt may take before it is abandoned.
    pub attempt_timeout: Duration,

    /// Delay before the first retry. Doubles on every further retry.
    pub initial_backoff: Duration,

    /// Upper bound on the delay between two attempts.
    pub max_backoff: Duration,

    /// Random jitter added to every delay.
    pub spread: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            spread: Duration::from_millis(50),
        }
    }
}

/// Configuration for a [crate::registries::dns::DnsRegistry].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DnsRegistryConfig {
    /// DNS servers to query.
    pub servers: Vec<SocketAddr>,

    /// SRV names of the services to expose, e.g. `_catalog._tcp.example.com`.
    pub services: Vec<service::Name>,

    /// How long a single lookup may take.
    pub query_timeout: Duration,

    /// Scheme placed in front of the resolved address of every instance.
    pub scheme: String,
}

impl Default for DnsRegistryConfig {
    fn default() -> Self {
        Self {
            servers: vec![],
            services: vec![],
            query_timeout: Duration::from_secs(10),
            scheme: "http".to_string(),
        }
    }
}
