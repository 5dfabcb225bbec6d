//! SSRF protection for outbound REST adapter calls and backend URL
//! validation (spec.md §4.9, §7 edge cases).

use crate::config::{BackendValidationConfig, SsrfProtection};
use crate::error::GatewayError;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use url::Url;

/// Validates `url_str` against `config` before a REST adapter call or a
/// backend registration (spec.md §4.9 step 3, §7 "backend registered with
/// a URL resolving to a private/loopback address").
pub fn validate_url(url_str: &str, config: &BackendValidationConfig) -> Result<(), GatewayError> {
    let url = Url::parse(url_str)
        .map_err(|e| GatewayError::configuration(format!("invalid backend URL: {e}")))?;

    if !config.allowed_schemes.iter().any(|s| s == url.scheme()) {
        return Err(GatewayError::configuration(format!(
            "scheme {} not in allowed_schemes",
            url.scheme()
        )));
    }

    let Some(host) = url.host_str() else {
        return Err(GatewayError::configuration("URL has no host"));
    };

    if config.blocked_hosts.iter().any(|h| h == host) {
        return Err(GatewayError::configuration(format!("host {host} is blocked")));
    }

    if matches!(config.ssrf_protection, SsrfProtection::Disabled) {
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let addrs: Vec<IpAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| GatewayError::configuration(format!("failed to resolve host {host}: {e}")))?
        .map(|sa| sa.ip())
        .collect();

    for ip in &addrs {
        validate_ip(*ip, &config.ssrf_protection)?;
    }
    Ok(())
}

fn validate_ip(ip: IpAddr, protection: &SsrfProtection) -> Result<(), GatewayError> {
    if let SsrfProtection::Balanced { allowed_private_networks } = protection {
        if allowed_private_networks.iter().any(|net| net.contains(ip)) {
            return Ok(());
        }
    }

    if let IpAddr::V4(v4) = ip {
        if v4 == Ipv4Addr::new(169, 254, 169, 254) {
            return Err(GatewayError::configuration("cloud metadata endpoint is blocked"));
        }
    }

    let blocked = ip.is_loopback()
        || is_link_local(ip)
        || is_private(ip)
        || ip.is_unspecified()
        || is_broadcast(ip);

    if blocked {
        Err(GatewayError::configuration(format!("IP {ip} is not routable from this gateway")))
    } else {
        Ok(())
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => v6.segments()[0] & 0xfe00 == 0xfc00,
    }
}

fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => v6.segments()[0] & 0xffc0 == 0xfe80,
    }
}

fn is_broadcast(ip: IpAddr) -> bool {
    matches!(ip, IpAddr::V4(v4) if v4.is_broadcast())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn strict() -> BackendValidationConfig {
        BackendValidationConfig::default()
    }

    #[test]
    fn loopback_v4_is_blocked_under_strict() {
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), &SsrfProtection::Strict).is_err());
    }

    #[test]
    fn private_v4_is_blocked_under_strict() {
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), &SsrfProtection::Strict).is_err());
    }

    #[test]
    fn cloud_metadata_is_always_blocked() {
        let balanced = SsrfProtection::Balanced { allowed_private_networks: vec!["10.0.0.0/8".parse().unwrap()] };
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254)), &balanced).is_err());
    }

    #[test]
    fn balanced_allows_explicitly_listed_private_range() {
        let balanced = SsrfProtection::Balanced { allowed_private_networks: vec!["10.0.0.0/8".parse().unwrap()] };
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)), &balanced).is_ok());
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), &balanced).is_err());
    }

    #[test]
    fn public_ip_is_allowed() {
        assert!(validate_ip(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), &SsrfProtection::Strict).is_ok());
    }

    #[test]
    fn disabled_protection_skips_resolution() {
        let cfg = BackendValidationConfig { ssrf_protection: SsrfProtection::Disabled, ..strict() };
        assert!(validate_url("http://169.254.169.254/latest/meta-data", &cfg).is_ok());
    }

    #[test]
    fn ipv6_unique_local_is_blocked() {
        let ip = IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1));
        assert!(validate_ip(ip, &SsrfProtection::Strict).is_err());
    }

    #[test]
    fn scheme_not_in_allowlist_is_rejected() {
        let cfg = strict();
        assert!(validate_url("ftp://example.com/file", &cfg).is_err());
    }
}
