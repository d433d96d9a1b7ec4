//! Builds routes from an in-memory registry, changes its membership, and
//! shows how the routes follow.

use futures::StreamExt;
use http::Uri;
use instgate::instance::Instance;
use instgate::locator::RouteLocator;
use instgate::policy::LocatorConfig;
use instgate::registries::fixed::FixedRegistry;
use instgate::service;
use instgate::table::RouteTable;
use std::sync::Arc;

async fn print_routes(locator: &RouteLocator) -> anyhow::Result<()> {
    let mut routes = locator.route_definitions();
    while let Some(route) = routes.next().await {
        let route = route?;
        println!(
            "{:<24} {:<32} -> {}",
            route.id(),
            route.predicate().pattern(),
            route.target()
        );
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let registry = Arc::new(FixedRegistry::new([
        (
            service::Name::new("catalog"),
            vec![
                Instance::new("catalog", Uri::from_static("http://10.0.0.5:8080"))
                    .with_instance_id("7a1b"),
                Instance::new("catalog", Uri::from_static("http://10.0.0.6:8080"))
                    .with_instance_id("9c2d"),
            ],
        ),
        (
            service::Name::new("billing"),
            vec![Instance::new(
                "billing",
                Uri::from_static("http://10.0.0.7:9000"),
            )],
        ),
        (service::Name::new("uaa"), vec![]),
    ]));

    let locator = match RouteLocator::new(registry.clone(), LocatorConfig::default()) {
        Ok(locator) => locator,
        Err(err) => err.into_inner(),
    };
    print_routes(&locator).await?;

    registry.remove(&service::Name::new("billing"));
    registry.insert(
        service::Name::new("uaa"),
        vec![Instance::new("uaa", Uri::from_static("http://10.0.0.8:9999")).with_instance_id("uaa-1")],
    );
    print_routes(&locator).await?;

    let table = RouteTable::from_definitions(locator.route_table().await?)?;
    for path in ["/gateway/catalog/7a1b/items/42", "/gateway/uaa/uaa-1/", "/api/account"] {
        match table.resolve(path) {
            Some(forward) => println!("{path} -> {}", forward.uri(None)?),
            None => println!("{path} -> (no route)"),
        }
    }
    Ok(())
}
