// SSRF protection for checkers that resolve or fetch the target URL.
//
// Blocks resolution into private, loopback and link-local ranges, and
// re-resolves the host afterwards to catch DNS answers swapped between the
// two lookups (rebinding).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;

#[derive(Debug, Error)]
pub enum SsrfError {
    #[error("blocked private address: {0}")]
    PrivateAddress(IpAddr),

    #[error("blocked via DNS rebinding check: {0}")]
    Rebinding(IpAddr),

    #[error("DNS resolution failed for {0}")]
    Resolution(String),

    #[error("host {0} has no A/AAAA records")]
    NoRecords(String),
}

impl SsrfError {
    /// True for the variants that represent a security block rather than a
    /// plain lookup failure. Callers must surface these as elevated risk,
    /// never as a silent zero score.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            SsrfError::PrivateAddress(_) | SsrfError::Rebinding(_)
        )
    }
}

/// Checks whether an IP belongs to a range outbound requests must never reach
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    // 0.0.0.0/8 (this network)
    if octets[0] == 0 {
        return true;
    }
    // 127.0.0.0/8 (loopback)
    if ip.is_loopback() {
        return true;
    }
    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
    if ip.is_private() {
        return true;
    }
    // 169.254.0.0/16 (link-local)
    if ip.is_link_local() {
        return true;
    }
    // 224.0.0.0/4 (multicast) and 240.0.0.0/4 (reserved)
    if octets[0] >= 224 {
        return true;
    }
    false
}

fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    // ::1 loopback
    if ip.is_loopback() {
        return true;
    }
    // :: unspecified
    if ip.is_unspecified() {
        return true;
    }
    // IPv4-mapped addresses inherit the IPv4 classification
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(v4);
    }
    let segments = ip.segments();
    // fc00::/7 unique local
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10 link-local
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    false
}

/// Hard-fails when `host` is an IP literal in a private range.
///
/// Domain names pass through; they are validated after resolution by
/// [`SsrfResolver::safe_resolve`].
pub fn block_if_private(host: &str) -> Result<(), SsrfError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(SsrfError::PrivateAddress(ip));
        }
    }
    Ok(())
}

/// DNS resolver that refuses to hand back private addresses
pub struct SsrfResolver {
    resolver: TokioAsyncResolver,
}

impl SsrfResolver {
    pub fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }

    /// Resolver from /etc/resolv.conf, the usual production path
    pub fn from_system_conf() -> Result<Self, SsrfError> {
        TokioAsyncResolver::tokio_from_system_conf()
            .map(Self::new)
            .map_err(|e| SsrfError::Resolution(e.to_string()))
    }

    /// Resolves `host` to its A/AAAA records, rejecting private addresses.
    ///
    /// A second combined lookup is performed after validation; if the answer
    /// set changed to include a private address in between, the host is
    /// rejected as a rebinding attempt.
    pub async fn safe_resolve(&self, host: &str) -> Result<Vec<IpAddr>, SsrfError> {
        // Direct IP literals skip DNS entirely
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_private_ip(ip) {
                return Err(SsrfError::PrivateAddress(ip));
            }
            return Ok(vec![ip]);
        }

        let v4: Vec<IpAddr> = match self.resolver.ipv4_lookup(host).await {
            Ok(lookup) => lookup.iter().map(|a| IpAddr::V4(a.0)).collect(),
            Err(_) => Vec::new(),
        };
        let v6: Vec<IpAddr> = match self.resolver.ipv6_lookup(host).await {
            Ok(lookup) => lookup.iter().map(|aaaa| IpAddr::V6(aaaa.0)).collect(),
            Err(_) => Vec::new(),
        };

        let ips: Vec<IpAddr> = v4.into_iter().chain(v6).collect();
        if ips.is_empty() {
            return Err(SsrfError::NoRecords(host.to_string()));
        }

        for ip in &ips {
            if is_private_ip(*ip) {
                return Err(SsrfError::PrivateAddress(*ip));
            }
        }

        // Rebinding check: re-resolve and validate the fresh answer set
        match self.resolver.lookup_ip(host).await {
            Ok(second) => {
                for ip in second.iter() {
                    if is_private_ip(ip) {
                        return Err(SsrfError::Rebinding(ip));
                    }
                }
            },
            Err(e) => {
                // First lookup succeeded; a transient failure here is not a block
                debug!("rebinding re-resolution of {} failed: {}", host, e);
            },
        }

        Ok(ips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private(addr: &str) -> bool {
        is_private_ip(addr.parse().unwrap())
    }

    #[test]
    fn private_ipv4_ranges_are_blocked() {
        assert!(private("127.0.0.1"));
        assert!(private("10.0.0.1"));
        assert!(private("192.168.1.1"));
        assert!(private("169.254.1.1"));
        assert!(private("172.16.0.1"));
        assert!(private("172.31.255.255"));
        assert!(private("0.0.0.0"));
        assert!(private("224.0.0.1"));
    }

    #[test]
    fn public_ipv4_passes() {
        assert!(!private("8.8.8.8"));
        assert!(!private("1.1.1.1"));
        assert!(!private("172.32.0.1"));
        assert!(!private("93.184.216.34"));
    }

    #[test]
    fn private_ipv6_ranges_are_blocked() {
        assert!(private("::1"));
        assert!(private("fc00::1"));
        assert!(private("fd12:3456::1"));
        assert!(private("fe80::1"));
        assert!(private("::ffff:192.168.1.1"));
    }

    #[test]
    fn public_ipv6_passes() {
        assert!(!private("2001:4860:4860::8888"));
    }

    #[test]
    fn block_if_private_rejects_ip_literals_only() {
        assert!(block_if_private("127.0.0.1").is_err());
        assert!(block_if_private("10.0.0.1").is_err());
        assert!(block_if_private("192.168.1.1").is_err());
        assert!(block_if_private("169.254.1.1").is_err());
        assert!(block_if_private("8.8.8.8").is_ok());
        // Domain names are validated post-resolution, not here
        assert!(block_if_private("localhost.example.com").is_ok());
    }

    #[test]
    fn blocked_variants_are_distinguished_from_lookup_failures() {
        assert!(SsrfError::PrivateAddress("127.0.0.1".parse().unwrap()).is_blocked());
        assert!(SsrfError::Rebinding("10.0.0.1".parse().unwrap()).is_blocked());
        assert!(!SsrfError::Resolution("x".into()).is_blocked());
        assert!(!SsrfError::NoRecords("x".into()).is_blocked());
    }
}
