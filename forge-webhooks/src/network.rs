//! Network policy guarding outbound deliveries against SSRF

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;
use url::{Host, Url};

/// Which address ranges a delivery may connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPolicy {
    allow_loopback: bool,
    allow_private_network: bool,
}

impl NetworkPolicy {
    pub fn new(allow_loopback: bool, allow_private_network: bool) -> Self {
        Self {
            allow_loopback,
            allow_private_network,
        }
    }

    /// Policy for trusted platform infrastructure
    pub fn unrestricted() -> Self {
        Self::new(true, true)
    }

    /// Check if a connection to `ip` is allowed
    pub fn permits(&self, ip: IpAddr) -> bool {
        let ip = canonical(ip);
        if is_loopback(ip) {
            return self.allow_loopback;
        }
        if is_private(ip) {
            return self.allow_private_network;
        }
        true
    }

    /// Reject URLs whose host is an IP literal outside the policy.
    ///
    /// Domain names are checked by [`GuardedResolver`] when they get resolved.
    pub fn check_url(&self, url: &Url) -> Result<(), ResolveError> {
        let ip = match url.host() {
            Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
            Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
            _ => return Ok(()),
        };

        if self.permits(ip) {
            Ok(())
        } else {
            Err(ResolveError::Blocked(ip.to_string()))
        }
    }
}

/// Failures raised while resolving a delivery target
#[derive(Debug, Error)]
pub enum ResolveError {
    /// DNS lookup returned nothing for the host
    #[error("host '{0}' was not found")]
    NotFound(String),

    /// Every resolved address is forbidden by the policy
    #[error("destination '{0}' is not allowed")]
    Blocked(String),

    /// The lookup itself failed, e.g. the DNS server was unreachable
    #[error("failed to resolve host '{host}': {reason}")]
    Lookup { host: String, reason: String },
}

impl ResolveError {
    /// Map a failed lookup; only a definite "no such name" answer counts as not found
    pub(crate) fn from_lookup(host: String, err: &io::Error) -> Self {
        if is_unknown_host(err) {
            ResolveError::NotFound(host)
        } else {
            ResolveError::Lookup {
                host,
                reason: err.to_string(),
            }
        }
    }
}

fn is_unknown_host(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }
    // getaddrinfo surfaces EAI_NONAME / EAI_NODATA only through the message
    let message = err.to_string().to_ascii_lowercase();
    ["not known", "no address associated", "no such host"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// DNS resolver that drops addresses the policy forbids
#[derive(Debug, Clone)]
pub struct GuardedResolver {
    policy: NetworkPolicy,
}

impl GuardedResolver {
    pub fn new(policy: NetworkPolicy) -> Self {
        Self { policy }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let policy = self.policy;
        Box::pin(async move {
            let host = name.as_str().to_string();
            let lookup_name = host.clone();
            let resolved: Vec<SocketAddr> = match tokio::net::lookup_host((lookup_name.as_str(), 0)).await {
                Ok(addrs) => addrs.collect(),
                Err(err) => return Err(ResolveError::from_lookup(host, &err).into()),
            };
            if resolved.is_empty() {
                return Err(ResolveError::NotFound(host).into());
            }

            let allowed: Vec<SocketAddr> = resolved
                .into_iter()
                .filter(|addr| policy.permits(addr.ip()))
                .collect();
            if allowed.is_empty() {
                return Err(ResolveError::Blocked(host).into());
            }

            let addrs: Addrs = Box::new(allowed.into_iter());
            Ok(addrs)
        })
    }
}

/// Unwrap IPv4-mapped IPv6 addresses
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

fn is_loopback(ip: IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10 carrier-grade NAT
    let shared = a == 100 && (b & 0xc0) == 64;
    ip.is_private() || ip.is_link_local() || shared
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
