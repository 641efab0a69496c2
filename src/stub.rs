//! Deterministic in-memory [`Capabilities`] for tests and demos.
//!
//! Nothing here touches the network. Responses are configured up front with
//! the builder methods, and every call is recorded so tests can check which
//! lookups ran.

use crate::{
    backend::Capabilities,
    errors::LookupError,
    ua::{Device, Software, UaClient},
    whois::WhoisQuery,
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    io,
    net::IpAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use tokio::time::{sleep_until, Instant};

/// The capabilities a [`StubBackend`] can be told to misbehave on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubLookup {
    ReverseDns,
    Whois,
    /// Only counted; classification is synchronous and cannot hang.
    UserAgent,
}

#[derive(Default)]
pub struct StubBackend {
    ptr_names: Vec<String>,
    whois: HashMap<String, String>,
    hanging: HashSet<StubLookup>,
    failing: HashSet<StubLookup>,
    delay: Option<Duration>,
    ptr_calls: AtomicUsize,
    ua_calls: AtomicUsize,
    whois_queries: Mutex<Vec<WhoisQuery>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names returned by every PTR lookup.
    pub fn with_ptr_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ptr_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Raw response of `server`. Servers without a response refuse the
    /// connection.
    pub fn with_whois(mut self, server: &str, response: &str) -> Self {
        self.whois.insert(server.to_ascii_lowercase(), response.to_string());
        self
    }

    /// Calls to `lookup` never complete.
    pub fn hanging(mut self, lookup: StubLookup) -> Self {
        self.hanging.insert(lookup);
        self
    }

    /// Calls to `lookup` fail immediately.
    pub fn failing(mut self, lookup: StubLookup) -> Self {
        self.failing.insert(lookup);
        self
    }

    /// Every network call takes this long (or until its deadline).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, lookup: StubLookup) -> usize {
        match lookup {
            StubLookup::ReverseDns => self.ptr_calls.load(Ordering::SeqCst),
            StubLookup::Whois => self.recorded().len(),
            StubLookup::UserAgent => self.ua_calls.load(Ordering::SeqCst),
        }
    }

    /// Every whois exchange attempted so far, in order.
    pub fn whois_queries(&self) -> Vec<WhoisQuery> {
        self.recorded().clone()
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Vec<WhoisQuery>> {
        self.whois_queries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate(&self, lookup: StubLookup, deadline: Instant) -> Result<(), LookupError> {
        if self.hanging.contains(&lookup) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            let ready = Instant::now() + delay;
            sleep_until(ready.min(deadline)).await;
            if ready > deadline {
                return Err(LookupError::Timeout);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Capabilities for StubBackend {
    async fn lookup_ptr(&self, ip: IpAddr, deadline: Instant) -> Result<Vec<String>, LookupError> {
        self.ptr_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(StubLookup::ReverseDns, deadline).await?;
        if self.failing.contains(&StubLookup::ReverseDns) {
            return Err(LookupError::Dns(format!("no PTR record for {}", ip)));
        }
        Ok(self.ptr_names.clone())
    }

    /// The browser family is the first product token, e.g. "curl" for
    /// "curl/8.4.0".
    fn classify(&self, user_agent: &str) -> UaClient {
        self.ua_calls.fetch_add(1, Ordering::SeqCst);
        let product = user_agent.split_whitespace().next().unwrap_or_default();
        let (family, version) = match product.split_once('/') {
            Some((family, version)) => (family, Some(version.to_string())),
            None => (product, None),
        };
        let browser = Software {
            family: family.to_string(),
            major: version,
            minor: None,
            patch: None,
        };

        UaClient {
            browser,
            os: Software {
                family: "Other".to_string(),
                major: None,
                minor: None,
                patch: None,
            },
            device: Device {
                family: "Other".to_string(),
            },
        }
    }

    async fn whois_exchange(&self, query: &WhoisQuery, deadline: Instant) -> Result<String, LookupError> {
        query.to_request()?;
        self.recorded().push(query.clone());
        self.simulate(StubLookup::Whois, deadline).await?;

        if self.failing.contains(&StubLookup::Whois) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "stub whois failure").into());
        }
        self.whois
            .get(&query.server.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("{} refused the connection", query.server),
                )
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_whois_queries() {
        let stub = StubBackend::new().with_whois("Whois.Example", "body");
        let deadline = Instant::now() + Duration::from_secs(1);

        let ok = stub.whois_exchange(&WhoisQuery::new("192.0.2.1", "whois.example"), deadline).await;
        let refused = stub.whois_exchange(&WhoisQuery::new("192.0.2.1", "other.example"), deadline).await;

        assert_eq!(ok.unwrap(), "body");
        assert!(matches!(refused, Err(LookupError::Transport(_))));
        assert_eq!(stub.calls(StubLookup::Whois), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_bounded_by_deadline() {
        let stub = StubBackend::new().with_delay(Duration::from_secs(10));
        let deadline = Instant::now() + Duration::from_secs(1);

        let result = stub.lookup_ptr("192.0.2.1".parse().unwrap(), deadline).await;

        assert!(matches!(result, Err(LookupError::Timeout)));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let stub = StubBackend::new();
        let client = stub.classify("curl/8.4.0");
        assert_eq!(client.browser.family, "curl");
        assert_eq!(client.browser.major.as_deref(), Some("8.4.0"));
        assert_eq!(stub.calls(StubLookup::UserAgent), 1);
    }
}
