//! The interface for the registry, which knows which services and instances
//! are currently alive.

use crate::instance::Instance;
use crate::service;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry query timed out")]
    Timeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    #[cfg(feature = "probes")]
    // Convert to a static string for USDT probes.
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Error::Unavailable(_) => "Unavailable",
            Error::Timeout => "Timeout",
            Error::Other(_) => "Other",
        }
    }
}

/// Read-only access to a service-discovery registry.
///
/// Every call is expected to reflect the registry's state at the time of the
/// call. Implementations must not add retries of their own unless that is
/// their whole purpose (see [crate::registries::retry]).
#[async_trait]
pub trait Registry: Send + Sync {
    /// Lists the names of all services the registry currently knows about.
    ///
    /// No ordering is promised across calls.
    async fn list_services(&self) -> Result<Vec<service::Name>, Error>;

    /// Lists the live instances of a single service.
    ///
    /// An unknown service yields an empty list rather than an error.
    async fn list_instances(&self, service: &service::Name) -> Result<Vec<Instance>, Error>;
}

/// Helper type for anything that implements the Registry interface.
pub type SharedRegistry = Arc<dyn Registry>;
