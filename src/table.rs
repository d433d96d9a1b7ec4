//! A routing table built from route definitions, ready to match requests.

use crate::route::{self, CompiledRewrite, RouteDefinition, RouteId};

use http::Uri;
use std::collections::BTreeMap;
use tracing::{event, Level};

struct Entry {
    definition: RouteDefinition,
    rewrite: CompiledRewrite,
}

/// Where a request should be sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forward {
    pub route: RouteId,
    pub target: Uri,
    /// The rewritten request path.
    pub path: String,
}

impl Forward {
    /// The URI to forward to: the scheme and authority of the target, with
    /// the rewritten path and the original query.
    pub fn uri(&self, query: Option<&str>) -> Result<Uri, http::Error> {
        let mut builder = Uri::builder();
        if let Some(scheme) = self.target.scheme_str() {
            builder = builder.scheme(scheme);
        }
        if let Some(authority) = self.target.authority() {
            builder = builder.authority(authority.as_str());
        }
        let path_and_query = match query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        };
        builder.path_and_query(path_and_query).build()
    }
}

/// Compiled routes, keyed by route id.
///
/// When two definitions share an id, the one added last wins.
#[derive(Default)]
pub struct RouteTable {
    routes: BTreeMap<RouteId, Entry>,
}

impl RouteTable {
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = RouteDefinition>,
    ) -> Result<Self, route::Error> {
        let mut table = Self::default();
        for definition in definitions {
            table.insert(definition)?;
        }
        Ok(table)
    }

    /// Adds a route, replacing any route with the same id.
    pub fn insert(&mut self, definition: RouteDefinition) -> Result<(), route::Error> {
        let rewrite = definition
            .rewrite()
            .compile()
            .map_err(|source| route::Error::InvalidRewrite {
                id: definition.id().clone(),
                source,
            })?;
        let id = definition.id().clone();
        let replaced = self.routes.insert(
            id.clone(),
            Entry {
                definition,
                rewrite,
            },
        );
        if let Some(old) = replaced {
            event!(
                Level::WARN,
                %id,
                old_target = %old.definition.target(),
                "Route id collision, replacing earlier route"
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RouteDefinition> {
        self.routes.get(id).map(|entry| &entry.definition)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.routes.values().map(|entry| &entry.definition)
    }

    /// Finds the route for a request path, and rewrites the path.
    ///
    /// If several predicates match (an id may contain '/'), the longest
    /// prefix wins.
    pub fn resolve(&self, path: &str) -> Option<Forward> {
        let entry = self
            .routes
            .values()
            .filter(|entry| entry.definition.predicate().matches(path))
            .max_by_key(|entry| entry.definition.predicate().prefix().len())?;
        Some(Forward {
            route: entry.definition.id().clone(),
            target: entry.definition.target().clone(),
            path: entry.rewrite.rewrite(path).into_owned(),
        })
    }
}
