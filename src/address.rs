use crate::{config::Config, errors::LookupError, headers::HeaderSnapshot};
use std::{fmt, net::IpAddr};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    IPv4,
    IPv6,
    Unknown,
}

impl AddressFamily {
    /// IPv4-mapped IPv6 addresses count as IPv4.
    pub fn of(address: &str) -> Self {
        match address.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => AddressFamily::IPv4,
            Ok(IpAddr::V6(v6)) if v6.to_ipv4_mapped().is_some() => AddressFamily::IPv4,
            Ok(IpAddr::V6(_)) => AddressFamily::IPv6,
            Err(_) => AddressFamily::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::IPv4 => "IPv4",
            AddressFamily::IPv6 => "IPv6",
            AddressFamily::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the address to report for the client, in order of preference:
/// the `host` override (debug only), the configured forwarding header, and
/// finally the address the transport observed. Any trailing port is removed.
///
/// An empty result is valid and means "unknown"; lookups that need an
/// address are skipped for it.
pub fn resolve_client_address(
    config: &Config,
    remote_addr: &str,
    host_override: Option<&str>,
    headers: &HeaderSnapshot,
) -> Result<String, LookupError> {
    if config.debug {
        if let Some(host) = host_override.map(str::trim).filter(|h| !h.is_empty()) {
            debug!("Using debug host override {}", host);
            return strip_port(host);
        }
    }

    // A blank header is treated as absent.
    if let Some(forwarded) = headers.get(&config.ip_header).and_then(first_forwarded) {
        return strip_port(forwarded);
    }

    strip_port(remote_addr)
}

/// IPv4-mapped IPv6 addresses (`::ffff:192.0.2.1`) in their plain IPv4 form.
/// Anything else is returned unchanged.
pub fn canonical_ip(address: &str) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => address.to_string(),
        },
        _ => address.to_string(),
    }
}

/// First entry of a `client, proxy1, proxy2` style header.
pub fn first_forwarded(header: &str) -> Option<&str> {
    header.split(',').map(str::trim).find(|addr| !addr.is_empty())
}

/// Removes a trailing `:port`. Addresses without a port, including bare IPv6
/// addresses, are returned unchanged.
pub fn strip_port(addr: &str) -> Result<String, LookupError> {
    let addr = addr.trim();

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            LookupError::AddressResolutionFailed(format!("missing ']' in {:?}", addr))
        })?;
        if !tail.is_empty() {
            let port = tail.strip_prefix(':').ok_or_else(|| {
                LookupError::AddressResolutionFailed(format!("unexpected text after ']' in {:?}", addr))
            })?;
            check_port(addr, port)?;
        }
        return Ok(host.to_string());
    }

    if addr.matches(':').count() == 1 {
        if let Some((host, port)) = addr.split_once(':') {
            check_port(addr, port)?;
            return Ok(host.to_string());
        }
    }

    Ok(addr.to_string())
}

fn check_port(addr: &str, port: &str) -> Result<(), LookupError> {
    port.parse::<u16>().map(|_| ()).map_err(|_| {
        LookupError::AddressResolutionFailed(format!("invalid port in {:?}", addr))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_header(header: &str) -> Config {
        Config {
            ip_header: header.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("203.0.113.5:54321").unwrap(), "203.0.113.5");
        assert_eq!(strip_port("203.0.113.5").unwrap(), "203.0.113.5");
        assert_eq!(strip_port("[2001:db8::1]:443").unwrap(), "2001:db8::1");
        assert_eq!(strip_port("[2001:db8::1]").unwrap(), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1").unwrap(), "2001:db8::1");
        assert_eq!(strip_port("").unwrap(), "");
    }

    #[test]
    fn test_strip_port_rejects_malformed() {
        assert!(matches!(strip_port("[2001:db8::1"), Err(LookupError::AddressResolutionFailed(_))));
        assert!(matches!(strip_port("[::1]x"), Err(LookupError::AddressResolutionFailed(_))));
        assert!(matches!(strip_port("203.0.113.5:http"), Err(LookupError::AddressResolutionFailed(_))));
    }

    #[test]
    fn test_transport_address_used_by_default() {
        let config = Config::default();
        let headers = HeaderSnapshot::new();
        let addr = resolve_client_address(&config, "198.51.100.7:1234", None, &headers).unwrap();
        assert_eq!(addr, "198.51.100.7");
    }

    #[test]
    fn test_override_only_in_debug() {
        let headers = HeaderSnapshot::new();

        let config = Config::default();
        let addr = resolve_client_address(&config, "198.51.100.7:1234", Some("8.8.8.8"), &headers).unwrap();
        assert_eq!(addr, "198.51.100.7");

        let config = Config { debug: true, ..Config::default() };
        let addr = resolve_client_address(&config, "198.51.100.7:1234", Some("8.8.8.8"), &headers).unwrap();
        assert_eq!(addr, "8.8.8.8");
    }

    #[test]
    fn test_forwarding_header() {
        let config = config_with_header("X-Forwarded-For");
        let headers: HeaderSnapshot = [("X-Forwarded-For", " 203.0.113.9, 10.0.0.1")].into_iter().collect();
        let addr = resolve_client_address(&config, "10.0.0.1:80", None, &headers).unwrap();
        assert_eq!(addr, "203.0.113.9");

        // Header configured but absent falls back to the transport address.
        let addr = resolve_client_address(&config, "10.0.0.1:80", None, &HeaderSnapshot::new()).unwrap();
        assert_eq!(addr, "10.0.0.1");
    }

    #[test]
    fn test_blank_forwarding_header_falls_back_to_transport() {
        let config = config_with_header("X-Forwarded-For");

        for blank in ["", "  ", " , "] {
            let headers: HeaderSnapshot = [("X-Forwarded-For", blank)].into_iter().collect();
            let addr = resolve_client_address(&config, "198.51.100.7:1234", None, &headers).unwrap();
            assert_eq!(addr, "198.51.100.7", "header value {:?}", blank);
        }
    }

    #[test]
    fn test_canonical_ip() {
        assert_eq!(canonical_ip("::ffff:192.0.2.1"), "192.0.2.1");
        assert_eq!(canonical_ip("192.0.2.1"), "192.0.2.1");
        assert_eq!(canonical_ip("2001:db8::1"), "2001:db8::1");
        assert_eq!(canonical_ip("not-an-ip"), "not-an-ip");
    }

    #[test]
    fn test_address_family() {
        assert_eq!(AddressFamily::of("192.0.2.1"), AddressFamily::IPv4);
        assert_eq!(AddressFamily::of("::ffff:192.0.2.1"), AddressFamily::IPv4);
        assert_eq!(AddressFamily::of("2001:db8::1"), AddressFamily::IPv6);
        assert_eq!(AddressFamily::of("example.com"), AddressFamily::Unknown);
        assert_eq!(AddressFamily::IPv6.to_string(), "IPv6");
    }
}
