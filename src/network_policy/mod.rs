//! Navigation target validation (SSRF protection).
//!
//! [`NetworkPolicy::validate`] runs immediately before every navigation and
//! turns a caller-supplied URL into a single-use [`TargetDescriptor`]:
//!
//! 1. only `http`/`https` schemes are accepted (no DNS lookup otherwise)
//! 2. loopback names, cloud metadata hosts and internal pseudo-TLDs are denied
//! 3. an optional allowlist restricts hosts to listed domains and subdomains
//! 4. every resolved address must be public
//!
//! Descriptors are never cached: a fresh validation runs per navigation.

pub mod ip_ranges;
pub mod resolver;

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

pub use ip_ranges::is_forbidden_ip;
pub use resolver::{SystemResolver, TargetResolver};

/// Hostnames that always point inside the host or the cloud control plane.
const DENIED_HOSTNAMES: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "::1",
    "0.0.0.0",
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.com",
    "169.254.169.254",
    "instance-data.ec2.internal",
];

const DENIED_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost"];

/// A URL that passed validation. Not `Clone`: consumed by the navigation it
/// was validated for.
#[derive(Debug)]
pub struct TargetDescriptor {
    original_url: String,
    canonical_url: Url,
    validated: bool,
}

impl TargetDescriptor {
    #[must_use]
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    #[must_use]
    pub fn canonical_url(&self) -> &Url {
        &self.canonical_url
    }

    #[must_use]
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Consume the descriptor, yielding the URL to navigate to.
    #[must_use]
    pub fn into_url(self) -> Url {
        self.canonical_url
    }
}

/// SSRF policy: denylist, optional allowlist and address checks.
#[derive(Clone)]
pub struct NetworkPolicy {
    allowlist: Vec<String>,
    resolver: Arc<dyn TargetResolver>,
}

impl std::fmt::Debug for NetworkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPolicy")
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}

impl NetworkPolicy {
    /// `allowlist` entries are expected lower-cased (as `EngineConfig` stores them).
    #[must_use]
    pub fn new(allowlist: Vec<String>, resolver: Arc<dyn TargetResolver>) -> Self {
        Self {
            allowlist,
            resolver,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig, resolver: Arc<dyn TargetResolver>) -> Self {
        Self::new(config.target_allowlist().to_vec(), resolver)
    }

    /// Validate `raw_url` as a navigation target.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidTarget`] for unparseable URLs, non-http(s)
    ///   schemes, missing hosts and hosts that do not resolve
    /// - [`EngineError::ForbiddenTarget`] for denied hosts, hosts outside the
    ///   allowlist and hosts resolving to any non-public address
    pub async fn validate(&self, raw_url: &str) -> EngineResult<TargetDescriptor> {
        let trimmed = raw_url.trim();
        let mut url = Url::parse(trimmed)
            .map_err(|e| EngineError::InvalidTarget(format!("'{trimmed}' is not a valid URL: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::InvalidTarget(format!(
                "scheme '{}' is not allowed; only http and https are supported",
                url.scheme()
            )));
        }

        let host = url
            .host()
            .map(|h| h.to_owned())
            .ok_or_else(|| EngineError::InvalidTarget(format!("'{trimmed}' has no host")))?;
        let hostname = normalized_hostname(&host);

        if is_denied_hostname(&hostname) {
            warn!(host = %hostname, "Rejected denylisted navigation target");
            return Err(EngineError::ForbiddenTarget(format!(
                "host '{hostname}' is not reachable from the renderer"
            )));
        }

        if !self.is_allowlisted(&hostname) {
            warn!(host = %hostname, "Rejected navigation target outside allowlist");
            return Err(EngineError::ForbiddenTarget(format!(
                "host '{hostname}' is not in the target allowlist"
            )));
        }

        let addresses = self.addresses_for(&host, &hostname, &url).await?;
        if let Some(bad) = addresses.iter().copied().find(|ip| is_forbidden_ip(*ip)) {
            warn!(host = %hostname, address = %bad, "Rejected navigation target resolving to a private address");
            return Err(EngineError::ForbiddenTarget(format!(
                "host '{hostname}' resolves to non-public address {bad}"
            )));
        }

        url.set_fragment(None);
        debug!(url = %url, addresses = addresses.len(), "Navigation target validated");

        Ok(TargetDescriptor {
            original_url: raw_url.to_string(),
            canonical_url: url,
            validated: true,
        })
    }

    fn is_allowlisted(&self, hostname: &str) -> bool {
        self.allowlist.is_empty()
            || self.allowlist.iter().any(|entry| {
                hostname == entry
                    || hostname
                        .strip_suffix(entry.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
    }

    async fn addresses_for(
        &self,
        host: &Host<String>,
        hostname: &str,
        url: &Url,
    ) -> EngineResult<Vec<IpAddr>> {
        match host {
            Host::Ipv4(ip) => Ok(vec![IpAddr::V4(*ip)]),
            Host::Ipv6(ip) => Ok(vec![IpAddr::V6(*ip)]),
            Host::Domain(_) => {
                let port = url.port_or_known_default().unwrap_or(443);
                let addresses = self.resolver.resolve(hostname, port).await.map_err(|e| {
                    EngineError::InvalidTarget(format!("could not resolve host '{hostname}': {e}"))
                })?;
                if addresses.is_empty() {
                    return Err(EngineError::InvalidTarget(format!(
                        "host '{hostname}' did not resolve to any address"
                    )));
                }
                Ok(addresses)
            }
        }
    }
}

/// Lower-cased host without IPv6 brackets or a trailing dot.
fn normalized_hostname(host: &Host<String>) -> String {
    match host {
        Host::Domain(domain) => domain.trim_end_matches('.').to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn is_denied_hostname(hostname: &str) -> bool {
    DENIED_HOSTNAMES.contains(&hostname)
        || DENIED_SUFFIXES.iter().any(|suffix| hostname.ends_with(suffix))
}
