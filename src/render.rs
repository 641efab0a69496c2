use crate::aggregate::AggregateResult;
use std::fmt::Write;

/// Command line clients get the plain text form instead of JSON.
pub fn is_cli_client(user_agent: Option<&str>) -> bool {
    user_agent.is_some_and(|ua| ua.starts_with("curl/") || ua.starts_with("Wget/"))
}

/// Line oriented form of `result`, for terminals.
pub fn to_text(result: &AggregateResult) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "IP: {}", result.remote_addr);
    if let Some(dns) = &result.reverse_dns {
        for name in &dns.names {
            let _ = writeln!(out, "DNS: {}", name);
        }
        if let Some(error) = &dns.error {
            let _ = writeln!(out, "DNS error: {}", error);
        }
    }
    out.push('\n');

    if let Some(whois) = &result.whois {
        out.push_str("WHOIS:\n");
        match (&whois.body, &whois.error) {
            (Some(body), _) => {
                let _ = writeln!(out, "{}", body);
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "error: {}", error);
            }
            (None, None) => {}
        }
        out.push('\n');
    }

    let location = &result.location;
    let place: Vec<&str> = [&location.city, &location.region, &location.country]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .collect();
    let _ = write!(out, "Location: {}", place.join(" "));
    match (location.lat, location.long) {
        (Some(lat), Some(long)) if lat != 0.0 && long != 0.0 => {
            let _ = write!(out, " ({}, {})", lat, long);
        }
        _ => {}
    }
    out.push_str("\n\n");

    let _ = writeln!(out, "ID: {}", result.request_id);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dns::DnsResult, errors::LookupError, location::LocationResult, whois::WhoisResult};

    fn result() -> AggregateResult {
        AggregateResult {
            request_id: "abc123".to_string(),
            remote_addr: "8.8.8.8".to_string(),
            remote_addr_family: "IPv4".to_string(),
            reverse_dns: Some(DnsResult::success("8.8.8.8", vec!["dns.google.".to_string()])),
            whois: Some(WhoisResult::success("8.8.8.8", "NetName: GOGL".to_string())),
            actual_remote_addr: "8.8.8.8:1234".to_string(),
            method: "GET".to_string(),
            url: "/".to_string(),
            proto: "HTTP/1.1".to_string(),
            headers: Default::default(),
            location: LocationResult {
                city: Some("mountain view".to_string()),
                region: Some("ca".to_string()),
                country: Some("US".to_string()),
                lat: Some(37.4),
                long: Some(-122.1),
                error: None,
            },
            user_agent: None,
            insights: Default::default(),
        }
    }

    #[test]
    fn test_cli_detection() {
        assert!(is_cli_client(Some("curl/8.4.0")));
        assert!(is_cli_client(Some("Wget/1.21.4")));
        assert!(!is_cli_client(Some("Mozilla/5.0 curl/8.4.0")));
        assert!(!is_cli_client(Some("")));
        assert!(!is_cli_client(None));
    }

    #[test]
    fn test_full_text() {
        let expected = "\
IP: 8.8.8.8
DNS: dns.google.

WHOIS:
NetName: GOGL

Location: mountain view ca US (37.4, -122.1)

ID: abc123
";
        assert_eq!(to_text(&result()), expected);
    }

    #[test]
    fn test_text_with_errors_and_no_coordinates() {
        let mut result = result();
        result.reverse_dns = Some(DnsResult::failure("8.8.8.8", &LookupError::Timeout));
        result.whois = Some(WhoisResult::failure("8.8.8.8", &LookupError::Timeout));
        result.location = LocationResult {
            country: Some("US".to_string()),
            lat: Some(0.0),
            long: Some(-122.1),
            ..LocationResult::default()
        };

        let text = to_text(&result);

        assert!(text.contains("DNS error: Lookup timed out\n"));
        assert!(text.contains("WHOIS:\nerror: Lookup timed out\n"));
        assert!(text.contains("Location: US\n"));
    }

    #[test]
    fn test_text_without_optional_lookups() {
        let mut result = result();
        result.reverse_dns = None;
        result.whois = None;
        let text = to_text(&result);
        assert!(text.starts_with("IP: 8.8.8.8\n\nLocation:"));
    }
}
