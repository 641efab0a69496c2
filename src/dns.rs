use crate::{backend::Capabilities, errors::LookupError};
use hickory_resolver::TokioResolver;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Reverse DNS data sent to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsResult {
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DnsResult {
    pub fn success(query: &str, names: Vec<String>) -> Self {
        Self {
            query: query.to_string(),
            names,
            error: None,
        }
    }

    pub fn failure(query: &str, error: &LookupError) -> Self {
        Self {
            query: query.to_string(),
            names: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Fixed name for loopback addresses, which have no useful PTR record.
pub fn loopback_name(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) if v4.is_loopback() => Some("localhost"),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) if v4.is_loopback() => Some("localhost"),
            Some(_) => None,
            None if v6.is_loopback() => Some("ip6-localhost"),
            None => None,
        },
        IpAddr::V4(_) => None,
    }
}

/// Looks up the names for `address`. Never fails; errors are reported
/// inside the returned result.
pub async fn reverse_lookup(backend: &dyn Capabilities, address: &str, deadline: Instant) -> DnsResult {
    let ip = match address.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(e) => {
            let error = LookupError::Parse(format!("{:?} is not an IP address: {}", address, e));
            return DnsResult::failure(address, &error);
        }
    };

    if let Some(name) = loopback_name(ip) {
        return DnsResult::success(address, vec![name.to_string()]);
    }

    match backend.lookup_ptr(ip, deadline).await {
        Ok(names) => DnsResult::success(address, names),
        Err(e) => {
            debug!("Reverse lookup for {} failed: {}", address, e);
            DnsResult::failure(address, &e)
        }
    }
}

/// PTR lookup through a hickory resolver, bounded by `deadline`.
pub async fn resolve_ptr(resolver: &TokioResolver, ip: IpAddr, deadline: Instant) -> Result<Vec<String>, LookupError> {
    let lookup = timeout_at(deadline, resolver.reverse_lookup(ip))
        .await?
        .map_err(|e| LookupError::Dns(e.to_string()))?;

    let names: Vec<String> = lookup.iter().map(|name| name.to_utf8()).collect();
    debug!("Reverse lookup for {} returned {} names", ip, names.len());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubBackend, StubLookup};
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_loopback_names() {
        assert_eq!(loopback_name("127.0.0.1".parse().unwrap()), Some("localhost"));
        assert_eq!(loopback_name("127.1.2.3".parse().unwrap()), Some("localhost"));
        assert_eq!(loopback_name("::1".parse().unwrap()), Some("ip6-localhost"));
        assert_eq!(loopback_name("::ffff:127.0.0.1".parse().unwrap()), Some("localhost"));
        assert_eq!(loopback_name("192.0.2.1".parse().unwrap()), None);
        assert_eq!(loopback_name("2001:db8::1".parse().unwrap()), None);
    }

    #[tokio::test]
    async fn test_localhost_short_circuit() {
        let stub = StubBackend::new().with_ptr_names(["should.not.be.used"]);

        let v4 = reverse_lookup(&stub, "127.0.0.1", deadline()).await;
        let v6 = reverse_lookup(&stub, "::1", deadline()).await;

        assert_eq!(v4.names, vec!["localhost"]);
        assert_eq!(v6.names, vec!["ip6-localhost"]);
        assert_eq!(stub.calls(StubLookup::ReverseDns), 0);
    }

    #[tokio::test]
    async fn test_uses_backend_for_other_addresses() {
        let stub = StubBackend::new().with_ptr_names(["dns.google."]);

        let result = reverse_lookup(&stub, "8.8.8.8", deadline()).await;

        assert_eq!(result, DnsResult::success("8.8.8.8", vec!["dns.google.".to_string()]));
        assert_eq!(stub.calls(StubLookup::ReverseDns), 1);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let stub = StubBackend::new();
        let result = reverse_lookup(&stub, "not-an-ip", deadline()).await;
        assert!(result.names.is_empty());
        assert!(result.error.unwrap().starts_with("Parse error"));
        assert_eq!(stub.calls(StubLookup::ReverseDns), 0);
    }

    #[tokio::test]
    async fn test_backend_error_is_reported() {
        let stub = StubBackend::new().failing(StubLookup::ReverseDns);
        let result = reverse_lookup(&stub, "192.0.2.1", deadline()).await;
        assert_eq!(result.query, "192.0.2.1");
        assert!(result.error.is_some());
    }
}
