//! Implementation of [Registry] for DNS

use crate::instance::{self, Instance};
use crate::policy::DnsRegistryConfig;
use crate::registry::{self, Registry};
use crate::service;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use hickory_resolver::config::LookupIpStrategy;
use hickory_resolver::config::NameServerConfig;
use hickory_resolver::config::Protocol;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::config::ResolverOpts;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use http::Uri;
use std::net::{Ipv6Addr, SocketAddr};
use tokio::time::timeout;
use tracing::{event, instrument, Level};

struct Client {
    address: SocketAddr,
    resolver: TokioAsyncResolver,
}

impl Client {
    fn new(config: &DnsRegistryConfig, address: SocketAddr) -> Self {
        let mut rc = ResolverConfig::new();
        rc.add_name_server(NameServerConfig {
            socket_addr: address,
            protocol: Protocol::Udp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
        let mut opts = ResolverOpts::default();
        opts.use_hosts_file = false;
        opts.ip_strategy = LookupIpStrategy::Ipv6Only;
        opts.negative_max_ttl = Some(std::time::Duration::from_secs(15));
        opts.timeout = config.query_timeout;
        opts.edns0 = true;
        let resolver = TokioAsyncResolver::tokio(rc, opts);
        Self { address, resolver }
    }

    #[instrument(skip(self, scheme), name = "Client::lookup_instances")]
    async fn lookup_instances(
        &self,
        service: &service::Name,
        scheme: &str,
    ) -> Result<Vec<Instance>, ResolveError> {
        // Look up all the SRV records for this particular name.
        let srv = self.resolver.srv_lookup(service.as_str()).await?;
        event!(Level::DEBUG, ?srv, "Successfully looked up SRV record");

        // Lower priority values are preferred, and within a priority, higher
        // weights. The first instance is the one that gets routed.
        let mut records: Vec<_> = srv.into_iter().collect();
        records.sort_by_key(|srv| (srv.priority(), std::cmp::Reverse(srv.weight())));

        let futures = std::iter::repeat(self.resolver.clone())
            .zip(records)
            .map(|(resolver, srv)| async move {
                let target = srv.target().clone();
                let port = srv.port();
                resolver
                    .ipv6_lookup(target.clone())
                    .await
                    .map(|aaaa| (target.to_utf8(), aaaa, port))
                    .map_err(|err| (target, err))
            });

        // Look up the AAAA records for each of the SRV records, keeping the
        // SRV order.
        let instances = futures::future::join_all(futures)
            .await
            .into_iter()
            .flat_map(|target| match target {
                Ok((target, aaaa, port)) => {
                    event!(Level::DEBUG, ?aaaa, "Successfully looked up AAAA record");
                    let instance_id = instance::Name::new(target.trim_end_matches('.'));
                    Some(aaaa.into_iter().filter_map(move |ip| {
                        let uri = instance_uri(scheme, *ip, port)?;
                        Some(
                            Instance::new(service.clone(), uri)
                                .with_instance_id(instance_id.clone()),
                        )
                    }))
                }
                Err((target, err)) => {
                    event!(Level::WARN, %target, ?err, "AAAA lookup failed");
                    None
                }
            })
            .flatten()
            .collect();
        Ok(instances)
    }
}

fn instance_uri(scheme: &str, ip: Ipv6Addr, port: u16) -> Option<Uri> {
    let uri = Uri::builder()
        .scheme(scheme)
        .authority(format!("[{ip}]:{port}"))
        .path_and_query("/")
        .build();
    match uri {
        Ok(uri) => Some(uri),
        Err(err) => {
            event!(Level::WARN, ?err, %ip, port, "Cannot build instance URI");
            None
        }
    }
}

/// Implements [crate::registry::Registry] via UDP DNS lookup.
///
/// Services are the configured SRV names. The instances of a service are the
/// targets of its SRV records, resolved to IPv6 addresses. Every call goes
/// out to the DNS servers; there is no background refresh.
///
/// Currently only supports Ipv6 addresses.
pub struct DnsRegistry {
    clients: Vec<Client>,
    config: DnsRegistryConfig,
}

impl DnsRegistry {
    pub fn new(config: DnsRegistryConfig) -> Self {
        let clients = config
            .servers
            .iter()
            .map(|address| Client::new(&config, *address))
            .collect();
        Self { clients, config }
    }
}

#[async_trait]
impl Registry for DnsRegistry {
    async fn list_services(&self) -> Result<Vec<service::Name>, registry::Error> {
        Ok(self.config.services.clone())
    }

    // Asks every DNS server, and takes whichever answers with records first.
    #[instrument(skip(self), err, name = "DnsRegistry::list_instances")]
    async fn list_instances(
        &self,
        service: &service::Name,
    ) -> Result<Vec<Instance>, registry::Error> {
        let duration = self.config.query_timeout;
        let scheme = self.config.scheme.as_str();
        let mut lookups: FuturesUnordered<_> = self
            .clients
            .iter()
            .map(|client| async move {
                let result = timeout(duration, client.lookup_instances(service, scheme)).await;
                (client, result)
            })
            .collect();

        // A server which has no records is not an error, but it is not
        // authoritative either: another server may still know the service.
        let mut saw_no_records_found = false;
        let mut last_error = None;

        while let Some((client, result)) = lookups.next().await {
            match result {
                Ok(Ok(instances)) => return Ok(instances),
                Ok(Err(err)) => match err.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        saw_no_records_found = true;
                    }
                    _ => {
                        event!(Level::ERROR, address = ?client.address, ?err, "DNS request failed");
                        last_error = Some(registry::Error::Unavailable(err.to_string()));
                    }
                },
                Err(_) => {
                    event!(Level::ERROR, address = ?client.address, "DNS request timed out");
                    last_error = Some(registry::Error::Timeout);
                }
            }
        }

        if saw_no_records_found {
            return Ok(vec![]);
        }
        Err(last_error
            .unwrap_or_else(|| registry::Error::Unavailable("No DNS servers".to_string())))
    }
}
