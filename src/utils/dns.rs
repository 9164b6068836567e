use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{Component, Error, ErrorKind, Result};

/// Resolves the mail exchanger for a domain and returns its host name.
///
/// The first MX record returned by the resolver is used as-is; preference
/// values are not consulted.
pub async fn lookup_mx_host(domain: &str) -> Result<String> {
    debug!("looking up MX records for {}", domain);

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let lookup = resolver.mx_lookup(domain).await.map_err(|e| {
        Error::new(Component::SendQueue, ErrorKind::CannotResolveDomain)
            .with_info(format!("MX lookup for domain '{domain}' failed"))
            .with_cause(e)
    })?;

    let record = lookup.iter().next().ok_or_else(|| {
        Error::new(Component::SendQueue, ErrorKind::CannotResolveDomain)
            .with_info(format!("domain '{domain}' has no MX records"))
    })?;

    let host = record
        .exchange()
        .to_string()
        .trim_end_matches('.')
        .to_string();
    debug!("MX for {} is {}", domain, host);
    Ok(host)
}
