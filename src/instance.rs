//! The description of a single running replica of a service.

use crate::service;

use http::Uri;
use std::sync::Arc;

/// Describes the name of an instance, unique within its service.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Debug, Hash)]
pub struct Name(pub Arc<str>);

impl Name {
    pub fn new(name: impl ToString) -> Self {
        Self(name.to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Name {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&'_ str> for Name {
    fn from(s: &'_ str) -> Self {
        Self(s.into())
    }
}

impl std::borrow::Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A single instance of a service, as reported by a registry.
///
/// The URI is taken on trust: registries are expected to hand out
/// something a proxy can connect to, and nothing here checks it.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Instance {
    pub service_id: service::Name,
    pub instance_id: Option<Name>,
    pub uri: Uri,
}

impl Instance {
    pub fn new(service_id: impl Into<service::Name>, uri: Uri) -> Self {
        Self {
            service_id: service_id.into(),
            instance_id: None,
            uri,
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<Name>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// The identifier used to address this instance.
    ///
    /// Falls back to the service identifier when the registry reported no
    /// instance identifier, or an empty one.
    pub fn effective_instance_id(&self) -> &str {
        match &self.instance_id {
            Some(id) if !id.as_str().is_empty() => id.as_str(),
            _ => self.service_id.as_str(),
        }
    }
}
