//! Fan-out of the per-request lookups.
//!
//! Every sub-lookup runs in its own tokio task and hands its value back
//! through its own `JoinHandle`. The handles are joined together, each bounded
//! by the request deadline; a task that has not finished by then is aborted
//! and its field records a timeout. The result is assembled only after every
//! handle has settled, so no field is ever written twice or read early.

use crate::{
    address::{canonical_ip, resolve_client_address, AddressFamily},
    backend::{Capabilities, NetworkBackend},
    config::Config,
    dns::{self, DnsResult},
    errors::LookupError,
    headers::HeaderSnapshot,
    insights,
    location::{self, LocationResult},
    ua::UaResult,
    whois::{WhoisResolver, WhoisResult},
};
use futures::future::OptionFuture;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{
    task::JoinHandle,
    time::{timeout_at, Instant},
};
use tracing::{debug, warn};

/// Which optional lookups to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupFlags {
    pub reverse_dns: bool,
    pub whois: bool,
    pub user_agent: bool,
}

impl Default for LookupFlags {
    fn default() -> Self {
        Self {
            reverse_dns: true,
            whois: true,
            user_agent: true,
        }
    }
}

impl LookupFlags {
    /// Builds flags from query parameter values. A lookup is on unless its
    /// parameter is exactly "false".
    pub fn from_query(reverse: Option<&str>, whois: Option<&str>, user_agent: Option<&str>) -> Self {
        let enabled = |value: Option<&str>| value != Some("false");
        Self {
            reverse_dns: enabled(reverse),
            whois: enabled(whois),
            user_agent: enabled(user_agent),
        }
    }
}

/// Everything the aggregator needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct LookupRequest {
    /// Address observed by the transport, possibly with a port.
    pub remote_addr: String,
    /// Debug-only replacement for the client address.
    pub host_override: Option<String>,
    pub headers: HeaderSnapshot,
    pub user_agent: Option<String>,
    pub flags: LookupFlags,
    /// Address family the client asked over ("IPv4" or "IPv6").
    pub family: Option<String>,
    pub method: String,
    pub url: String,
    pub proto: String,
    pub deadline: Instant,
}

impl LookupRequest {
    pub fn new(remote_addr: impl Into<String>, deadline: Instant) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            host_override: None,
            headers: HeaderSnapshot::new(),
            user_agent: None,
            flags: LookupFlags::default(),
            family: None,
            method: String::new(),
            url: String::new(),
            proto: String::new(),
            deadline,
        }
    }
}

/// The composite answer. Lookups that were not requested are `None` and left
/// out of the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    pub remote_addr: String,
    pub remote_addr_family: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_dns: Option<DnsResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois: Option<WhoisResult>,
    pub actual_remote_addr: String,
    pub method: String,
    pub url: String,
    pub proto: String,
    pub headers: HeaderSnapshot,
    pub location: LocationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<UaResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub insights: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct Aggregator {
    backend: Arc<dyn Capabilities>,
    whois: WhoisResolver,
    config: Arc<Config>,
}

impl Aggregator {
    pub fn new(backend: Arc<dyn Capabilities>, config: Arc<Config>) -> Self {
        Self {
            whois: WhoisResolver::new(backend.clone()),
            backend,
            config,
        }
    }

    /// Aggregator talking to the real network.
    pub fn from_config(config: Arc<Config>) -> Result<Self, LookupError> {
        let backend = NetworkBackend::new(config.clone())?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the requested lookups concurrently and assembles the result.
    ///
    /// Only an unusable client address fails the call; every other problem
    /// is reported in the `error` field of the sub-result concerned.
    pub async fn aggregate(&self, request: LookupRequest) -> Result<AggregateResult, LookupError> {
        let remote_addr = resolve_client_address(
            &self.config,
            &request.remote_addr,
            request.host_override.as_deref(),
            &request.headers,
        )?;
        let deadline = request.deadline;
        let flags = request.flags;
        let has_address = !remote_addr.is_empty();
        let lookup_address = canonical_ip(&remote_addr);

        let dns_task = (has_address && flags.reverse_dns).then(|| {
            let backend = self.backend.clone();
            let address = lookup_address.clone();
            tokio::spawn(async move { dns::reverse_lookup(backend.as_ref(), &address, deadline).await })
        });

        let whois_task = (has_address && flags.whois).then(|| {
            let resolver = self.whois.clone();
            let address = lookup_address.clone();
            tokio::spawn(async move { resolver.resolve(&address, deadline).await })
        });

        let user_agent = request
            .user_agent
            .as_deref()
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .map(str::to_string);
        let ua_task = match (flags.user_agent, user_agent) {
            (true, Some(ua)) => {
                let backend = self.backend.clone();
                Some(tokio::spawn(async move { backend.classify(&ua) }))
            }
            _ => None,
        };

        let location_task = {
            let config = self.config.clone();
            let headers = request.headers.clone();
            tokio::spawn(async move { location::extract(&config, &headers) })
        };

        let (reverse_dns, whois, classified, location) = tokio::join!(
            OptionFuture::from(dns_task.map(|task| settle("reverse_dns", task, deadline))),
            OptionFuture::from(whois_task.map(|task| settle("whois", task, deadline))),
            OptionFuture::from(ua_task.map(|task| settle("user_agent", task, deadline))),
            settle("location", location_task, deadline),
        );

        let reverse_dns = reverse_dns.map(|r| r.unwrap_or_else(|e| DnsResult::failure(&lookup_address, &e)));
        let whois = whois.map(|r| r.unwrap_or_else(|e| WhoisResult::failure(&lookup_address, &e)));
        let user_agent = match classified {
            Some(Ok(client)) => Some(UaResult::classified(client)),
            Some(Err(e)) => Some(UaResult::failure(&e)),
            None if flags.user_agent => Some(UaResult::failure(&LookupError::ClassificationUnavailable)),
            None => None,
        };
        let location = location.unwrap_or_else(|e| LocationResult::failure(&e));

        let request_id = request
            .headers
            .get(&self.config.request_id_header)
            .unwrap_or_default()
            .to_string();

        debug!("Aggregated lookups for {:?} (request {:?})", remote_addr, request_id);

        Ok(AggregateResult {
            request_id,
            remote_addr_family: AddressFamily::of(&remote_addr).to_string(),
            insights: insights::collect(&request.headers, &remote_addr, request.family.as_deref()),
            headers: request.headers.without(&self.config.disallowed_headers),
            remote_addr,
            reverse_dns,
            whois,
            actual_remote_addr: request.remote_addr,
            method: request.method,
            url: request.url,
            proto: request.proto,
            location,
            user_agent,
        })
    }
}

/// Waits for `task` until `deadline`. A task still running at the deadline
/// is aborted.
async fn settle<T>(lookup: &str, task: JoinHandle<T>, deadline: Instant) -> Result<T, LookupError> {
    let abort = task.abort_handle();
    match timeout_at(deadline, task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("{} lookup task failed: {}", lookup, e);
            Err(LookupError::Internal(format!("{} lookup task failed: {}", lookup, e)))
        }
        Err(_) => {
            warn!("{} lookup did not finish before the deadline", lookup);
            abort.abort();
            Err(LookupError::Timeout)
        }
    }
}
