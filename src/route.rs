//! Route definitions, synthesized one per registry instance.
//!
//! Each instance is given a route which is addressable below
//! [GATEWAY_PATH]:
//!
//! ```text
//! /gateway/{service}/{instance}/{rest...}  ->  {instance uri}/{rest...}
//! ```
//!
//! A [RouteDefinition] is plain data. It becomes something a proxy can
//! match against once its rewrite has been compiled, see
//! [RewritePath::compile] and [crate::table::RouteTable].

#[cfg(feature = "probes")]
use crate::probes;
use crate::instance::Instance;

use http::Uri;
use regex::Regex;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{event, Level};

/// The path segment reserved for per-instance routes.
pub const GATEWAY_PATH: &str = "/gateway/";

/// Name of the capture group holding the path forwarded to the instance.
const REMAINING_GROUP: &str = "remaining";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Rewrite for route {id} does not compile")]
    InvalidRewrite {
        id: RouteId,
        #[source]
        source: regex::Error,
    },
}

/// Identifies a route.
///
/// Always lowercase, and of the form `{service}/{instance}`.
#[derive(Clone, PartialEq, Eq, Ord, PartialOrd, Debug, Hash)]
pub struct RouteId(Arc<str>);

impl RouteId {
    /// Derives the identifier of the route for an instance.
    ///
    /// This depends only on the service and instance identifiers. Two
    /// instances which only differ in case share an identifier.
    pub fn for_instance(instance: &Instance) -> Self {
        let raw = format!(
            "{}/{}",
            instance.service_id,
            instance.effective_instance_id()
        );
        Self(raw.to_lowercase().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::borrow::Borrow<str> for RouteId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Matches request paths under `/gateway/{id}/**`.
///
/// `**` matches any number of trailing segments, including none. The id
/// segment is compared literally, so matching is case-sensitive.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct PathPredicate {
    pattern: String,
}

impl PathPredicate {
    fn for_route(id: &RouteId) -> Self {
        Self {
            pattern: format!("{GATEWAY_PATH}{id}/**"),
        }
    }

    /// The path pattern, e.g. `/gateway/catalog/7a1b/**`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The literal part of the pattern, without the trailing `/**`.
    pub fn prefix(&self) -> &str {
        self.pattern
            .strip_suffix("/**")
            .unwrap_or(self.pattern.as_str())
    }

    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Rewrites the request path before it is forwarded.
///
/// Stored as a regular expression and a replacement template; the
/// expression is applied to the whole path with replace-all semantics.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct RewritePath {
    regex: String,
    replacement: String,
}

impl RewritePath {
    fn for_route(id: &RouteId) -> Self {
        Self {
            regex: format!("{GATEWAY_PATH}{id}/(?<{REMAINING_GROUP}>.*)"),
            replacement: format!("/${{{REMAINING_GROUP}}}"),
        }
    }

    /// The match expression, e.g. `/gateway/catalog/7a1b/(?<remaining>.*)`.
    pub fn regex(&self) -> &str {
        &self.regex
    }

    /// The replacement template, `/${remaining}`.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Compiles the rewrite so it can be applied to paths.
    ///
    /// Identifiers are not escaped, so an identifier containing regex syntax
    /// may fail to compile here.
    pub fn compile(&self) -> Result<CompiledRewrite, regex::Error> {
        Ok(CompiledRewrite {
            regex: Regex::new(&self.regex)?,
            replacement: self.replacement.clone(),
        })
    }
}

/// A [RewritePath] ready to be applied.
#[derive(Clone, Debug)]
pub struct CompiledRewrite {
    regex: Regex,
    replacement: String,
}

impl CompiledRewrite {
    /// Rewrites a request path.
    ///
    /// Paths the expression does not match are returned unchanged.
    pub fn rewrite<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.regex.replace_all(path, self.replacement.as_str())
    }
}

/// How to recognize and forward requests destined for one instance.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct RouteDefinition {
    id: RouteId,
    target: Uri,
    predicate: PathPredicate,
    rewrite: RewritePath,
}

impl RouteDefinition {
    pub fn id(&self) -> &RouteId {
        &self.id
    }

    /// Where matching requests are forwarded.
    pub fn target(&self) -> &Uri {
        &self.target
    }

    pub fn predicate(&self) -> &PathPredicate {
        &self.predicate
    }

    pub fn rewrite(&self) -> &RewritePath {
        &self.rewrite
    }
}

/// Synthesizes the route for a single instance.
///
/// The instance URI is copied as-is; a registry reporting an unusable
/// URI produces a route which the proxy will fail to connect through.
pub fn synthesize(instance: &Instance) -> RouteDefinition {
    let id = RouteId::for_instance(instance);
    let definition = RouteDefinition {
        predicate: PathPredicate::for_route(&id),
        rewrite: RewritePath::for_route(&id),
        target: instance.uri.clone(),
        id,
    };
    event!(
        Level::DEBUG,
        id = %definition.id,
        target = %definition.target,
        "Synthesized route"
    );
    #[cfg(feature = "probes")]
    probes::route__synthesized!(|| (
        definition.id.as_str(),
        definition.target.to_string()
    ));
    definition
}

#[cfg(feature = "serde")]
impl serde::Serialize for RouteDefinition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(serde::Serialize)]
        struct PathArgs<'a> {
            pattern: &'a str,
        }

        #[derive(serde::Serialize)]
        struct RewriteArgs<'a> {
            regexp: &'a str,
            replacement: &'a str,
        }

        #[derive(serde::Serialize)]
        struct Definition<A: serde::Serialize> {
            name: &'static str,
            args: A,
        }

        #[derive(serde::Serialize)]
        struct Route<'a> {
            id: &'a str,
            uri: String,
            predicates: [Definition<PathArgs<'a>>; 1],
            filters: [Definition<RewriteArgs<'a>>; 1],
        }

        Route {
            id: self.id.as_str(),
            uri: self.target.to_string(),
            predicates: [Definition {
                name: "Path",
                args: PathArgs {
                    pattern: self.predicate.pattern(),
                },
            }],
            filters: [Definition {
                name: "RewritePath",
                args: RewriteArgs {
                    regexp: self.rewrite.regex(),
                    replacement: self.rewrite.replacement(),
                },
            }],
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn instance(service: &str, id: Option<&str>, uri: &'static str) -> Instance {
        let instance = Instance::new(service, Uri::from_static(uri));
        match id {
            Some(id) => instance.with_instance_id(id),
            None => instance,
        }
    }

    // Pulls the id out of "/gateway/{id}/**"
    fn predicate_id(definition: &RouteDefinition) -> &str {
        definition
            .predicate()
            .pattern()
            .strip_prefix(GATEWAY_PATH)
            .and_then(|s| s.strip_suffix("/**"))
            .unwrap()
    }

    // Pulls the id out of "/gateway/{id}/(?<remaining>.*)"
    fn rewrite_id(definition: &RouteDefinition) -> &str {
        definition
            .rewrite()
            .regex()
            .strip_prefix(GATEWAY_PATH)
            .and_then(|s| s.strip_suffix("/(?<remaining>.*)"))
            .unwrap()
    }

    #[test]
    fn route_for_instance_with_id() {
        let def = synthesize(&instance(
            "catalog",
            Some("7a1b"),
            "http://10.0.0.5:8080",
        ));
        assert_eq!(def.id().as_str(), "catalog/7a1b");
        assert_eq!(def.target(), &Uri::from_static("http://10.0.0.5:8080"));
        assert_eq!(def.predicate().pattern(), "/gateway/catalog/7a1b/**");
        assert_eq!(
            def.rewrite().regex(),
            "/gateway/catalog/7a1b/(?<remaining>.*)"
        );
        assert_eq!(def.rewrite().replacement(), "/${remaining}");
    }

    #[test]
    fn route_for_instance_without_id() {
        let def = synthesize(&instance("billing", None, "http://10.0.0.6:9000"));
        assert_eq!(def.id().as_str(), "billing/billing");
        assert_eq!(def.predicate().pattern(), "/gateway/billing/billing/**");

        let def = synthesize(&instance("billing", Some(""), "http://10.0.0.6:9000"));
        assert_eq!(def.id().as_str(), "billing/billing");
    }

    #[test]
    fn route_id_is_lowercased() {
        let def = synthesize(&instance(
            "Catalog",
            Some("HOST-7A1B:8080"),
            "http://10.0.0.5:8080",
        ));
        assert_eq!(def.id().as_str(), "catalog/host-7a1b:8080");

        let def = synthesize(&instance("BILLING", None, "http://10.0.0.6:9000"));
        assert_eq!(def.id().as_str(), "billing/billing");
    }

    #[test]
    fn predicate_and_rewrite_share_id() {
        let instances = [
            instance("catalog", Some("7a1b"), "http://10.0.0.5:8080"),
            instance("Billing", None, "http://10.0.0.6:9000"),
            instance("uaa", Some("uaa-1.internal:9999"), "http://10.0.0.7:9999"),
            instance("Gateway", Some("GW"), "https://gw.example.com"),
        ];
        for instance in &instances {
            let def = synthesize(instance);
            assert_eq!(predicate_id(&def), def.id().as_str());
            assert_eq!(rewrite_id(&def), def.id().as_str());
        }
    }

    #[test]
    fn predicate_matches_gateway_paths() {
        let def = synthesize(&instance(
            "catalog",
            Some("7a1b"),
            "http://10.0.0.5:8080",
        ));
        let predicate = def.predicate();
        assert!(predicate.matches("/gateway/catalog/7a1b/items/42"));
        assert!(predicate.matches("/gateway/catalog/7a1b/"));
        assert!(predicate.matches("/gateway/catalog/7a1b"));

        assert!(!predicate.matches("/gateway/catalog/7a1bc/items"));
        assert!(!predicate.matches("/gateway/catalog/other/items"));
        assert!(!predicate.matches("/gateway/Catalog/7a1b/items"));
        assert!(!predicate.matches("/api/catalog/7a1b/items"));
    }

    #[test]
    fn rewrite_strips_gateway_prefix() {
        let def = synthesize(&instance(
            "catalog",
            Some("7a1b"),
            "http://10.0.0.5:8080",
        ));
        let rewrite = def.rewrite().compile().unwrap();
        assert_eq!(rewrite.rewrite("/gateway/catalog/7a1b/items/42"), "/items/42");
        assert_eq!(
            rewrite.rewrite("/gateway/catalog/7a1b/items?page=2"),
            "/items?page=2"
        );
    }

    #[test]
    fn rewrite_of_empty_remainder_is_root() {
        let def = synthesize(&instance(
            "catalog",
            Some("7a1b"),
            "http://10.0.0.5:8080",
        ));
        let rewrite = def.rewrite().compile().unwrap();
        assert_eq!(rewrite.rewrite("/gateway/catalog/7a1b/"), "/");
    }

    #[test]
    fn rewrite_without_trailing_slash_leaves_path() {
        let def = synthesize(&instance(
            "catalog",
            Some("7a1b"),
            "http://10.0.0.5:8080",
        ));
        let rewrite = def.rewrite().compile().unwrap();
        assert_eq!(
            rewrite.rewrite("/gateway/catalog/7a1b"),
            "/gateway/catalog/7a1b"
        );
    }

    #[test]
    fn rewrite_with_regex_syntax_in_id_fails_to_compile() {
        let def = synthesize(&instance(
            "catalog",
            Some("bad(id"),
            "http://10.0.0.5:8080",
        ));
        assert!(def.rewrite().compile().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_route_definition() {
        let def = synthesize(&instance(
            "catalog",
            Some("7a1b"),
            "http://10.0.0.5:8080/",
        ));
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "catalog/7a1b",
                "uri": "http://10.0.0.5:8080/",
                "predicates": [{
                    "name": "Path",
                    "args": { "pattern": "/gateway/catalog/7a1b/**" },
                }],
                "filters": [{
                    "name": "RewritePath",
                    "args": {
                        "regexp": "/gateway/catalog/7a1b/(?<remaining>.*)",
                        "replacement": "/${remaining}",
                    },
                }],
            })
        );
    }
}
