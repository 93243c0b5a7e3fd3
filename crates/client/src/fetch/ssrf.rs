//! SSRF (Server-Side Request Forgery) protection.
//!
//! Link previews fetch arbitrary editor-supplied URLs from the server, so
//! every host is resolved first and rejected if any answer points at a
//! private, internal, or reserved address.

use std::net::IpAddr;
use std::sync::LazyLock;

use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use url::{Host, Url};

/// Ranges that `std`'s stable predicates do not cover.
static EXTRA_BLOCKED: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    let v4 = [
        Ipv4Net::new_assert([100, 64, 0, 0].into(), 10), // carrier-grade NAT
        Ipv4Net::new_assert([192, 0, 0, 0].into(), 24),  // IETF protocol assignments
        Ipv4Net::new_assert([198, 18, 0, 0].into(), 15), // benchmarking
        Ipv4Net::new_assert([240, 0, 0, 0].into(), 4),   // reserved
    ];
    let v6 = [
        Ipv6Net::new_assert([0xfc00, 0, 0, 0, 0, 0, 0, 0].into(), 7),  // unique local
        Ipv6Net::new_assert([0xfe80, 0, 0, 0, 0, 0, 0, 0].into(), 10), // link-local
    ];
    v4.into_iter().map(IpNet::V4).chain(v6.into_iter().map(IpNet::V6)).collect()
});

/// Error type for SSRF validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SsrfError {
    #[error("blocked IP: {0} (private/reserved)")]
    BlockedIp(IpAddr),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),

    #[error("URL has no host")]
    NoHost,
}

/// Check if an IP address is private, reserved, or otherwise blocked.
///
/// IPv4-mapped IPv6 addresses are judged by their IPv4 form.
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    };

    let std_blocked = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_multicast() || v6.is_unspecified(),
    };

    std_blocked || EXTRA_BLOCKED.iter().any(|net| net.contains(&ip))
}

/// Validate that an IP address is not private or reserved.
pub fn validate_ip(ip: IpAddr) -> Result<(), SsrfError> {
    if is_private_or_reserved(ip) { Err(SsrfError::BlockedIp(ip)) } else { Ok(()) }
}

/// Resolve the URL's host and validate every address it maps to.
///
/// IP-literal hosts are checked without a DNS round-trip.
pub async fn validate_host(url: &Url) -> Result<(), SsrfError> {
    let port = url.port_or_known_default().unwrap_or(443);

    match url.host().ok_or(SsrfError::NoHost)? {
        Host::Ipv4(v4) => validate_ip(IpAddr::V4(v4)),
        Host::Ipv6(v6) => validate_ip(IpAddr::V6(v6)),
        Host::Domain(domain) => {
            let addrs = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| SsrfError::DnsError(format!("{domain}: {e}")))?;

            let mut resolved = 0usize;
            for addr in addrs {
                validate_ip(addr.ip())?;
                resolved += 1;
            }

            if resolved == 0 {
                return Err(SsrfError::DnsError(format!("{domain}: no addresses")));
            }
            Ok(())
        }
    }
}

/// Decides whether a URL may be requested.
///
/// `FetchClient` consults the gate for the initial URL and again for every
/// redirect hop before following it.
#[async_trait]
pub trait HostGate: Send + Sync {
    async fn check(&self, url: &Url) -> Result<(), SsrfError>;
}

/// Resolves the host and requires every address to be public.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicAddressGate;

#[async_trait]
impl HostGate for PublicAddressGate {
    async fn check(&self, url: &Url) -> Result<(), SsrfError> {
        validate_host(url).await
    }
}
