use crate::{address::AddressFamily, headers::HeaderSnapshot};
use std::collections::BTreeMap;

const CHROME_COMPRESSION_PROXY: &str = "Chrome-Compression-Proxy";

/// Extra observations about the request that are not lookups of their own.
pub fn collect(headers: &HeaderSnapshot, remote_addr: &str, requested_family: Option<&str>) -> BTreeMap<String, String> {
    let mut insights = BTreeMap::new();

    if headers.get("Via").is_some_and(|via| via.contains(CHROME_COMPRESSION_PROXY)) {
        insights.insert("Proxy".to_string(), "Chrome Compression Proxy".to_string());
    }

    // The web page asks over both address families; a mismatch means the
    // client was routed over the other one.
    if let Some(requested) = requested_family.filter(|f| !f.is_empty()) {
        let actual = AddressFamily::of(remote_addr);
        if !requested.eq_ignore_ascii_case(actual.as_str()) {
            insights.insert("AddressMismatch".to_string(), actual.to_string());
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_insights() {
        let insights = collect(&HeaderSnapshot::new(), "192.0.2.1", Some("IPv4"));
        assert!(insights.is_empty());

        let insights = collect(&HeaderSnapshot::new(), "192.0.2.1", None);
        assert!(insights.is_empty());
    }

    #[test]
    fn test_compression_proxy() {
        let headers: HeaderSnapshot = [("Via", "1.1 Chrome-Compression-Proxy")].into_iter().collect();
        let insights = collect(&headers, "192.0.2.1", None);
        assert_eq!(insights.get("Proxy").map(String::as_str), Some("Chrome Compression Proxy"));
    }

    #[test]
    fn test_family_mismatch() {
        let insights = collect(&HeaderSnapshot::new(), "2001:db8::1", Some("IPv4"));
        assert_eq!(insights.get("AddressMismatch").map(String::as_str), Some("IPv6"));
    }
}
