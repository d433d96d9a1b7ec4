use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use instgate::locator::RouteLocator;
use instgate::policy::{DnsRegistryConfig, LocatorConfig, RetryPolicy};
use instgate::registries::dns::DnsRegistry;
use instgate::registries::retry::RetryingRegistry;
use instgate::registry::SharedRegistry;
use instgate::service;
use instgate::table::RouteTable;
use tracing_subscriber::EnvFilter;

/// Resolves services through DNS and prints one gateway route per service.
#[derive(Debug, Clone, Parser)]
pub struct Args {
    /// DNS server to query. May be repeated.
    #[clap(long = "dns-server", short = 'd', required = true)]
    pub dns_servers: Vec<SocketAddr>,

    /// SRV name of a service to route. May be repeated.
    #[clap(long = "service", short = 's', required = true)]
    pub services: Vec<String>,

    #[clap(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Attempts per registry call. One disables retries.
    #[clap(long, default_value_t = 1)]
    pub attempts: usize,

    /// Instead of printing the routes, show where this path is forwarded.
    #[clap(long)]
    pub resolve: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_ms);

    let dns = Arc::new(DnsRegistry::new(DnsRegistryConfig {
        servers: args.dns_servers,
        services: args.services.iter().map(service::Name::new).collect(),
        query_timeout: timeout,
        ..Default::default()
    }));
    let registry: SharedRegistry = if args.attempts > 1 {
        Arc::new(RetryingRegistry::new(
            dns,
            RetryPolicy {
                max_attempts: args.attempts,
                attempt_timeout: timeout,
                ..Default::default()
            },
        ))
    } else {
        dns
    };

    let locator = match RouteLocator::new(registry, LocatorConfig::default()) {
        Ok(locator) => locator,
        Err(err) => {
            tracing::warn!("{err}");
            err.into_inner()
        }
    };
    let routes = locator.route_table().await?;

    match args.resolve {
        Some(path) => {
            let table = RouteTable::from_definitions(routes)?;
            match table.resolve(&path) {
                Some(forward) => println!("{} -> {}", path, forward.uri(None)?),
                None => anyhow::bail!("no route for {path}"),
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&routes)?),
    }
    Ok(())
}
