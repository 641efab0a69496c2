use crate::{
    config::Config,
    dns,
    errors::LookupError,
    ua::{self, UaClient},
    whois::{self, WhoisQuery},
};
use async_trait::async_trait;
use hickory_resolver::{config::ResolverOpts, TokioResolver};
use std::{net::IpAddr, sync::Arc};
use tokio::time::Instant;
use tracing::info;

/// Everything the lookups need from the outside world.
///
/// Implementations must honour `deadline`: once it passes, the call should
/// return promptly (usually with [`LookupError::Timeout`]).
#[async_trait]
pub trait Capabilities: Send + Sync {
    /// Names from the PTR records of `ip`.
    async fn lookup_ptr(&self, ip: IpAddr, deadline: Instant) -> Result<Vec<String>, LookupError>;

    fn classify(&self, user_agent: &str) -> UaClient;

    /// One whois request/response exchange; returns the raw response text.
    async fn whois_exchange(&self, query: &WhoisQuery, deadline: Instant) -> Result<String, LookupError>;
}

/// Production capabilities: system DNS via hickory, whois over TCP port 43
/// and the built-in user-agent patterns.
pub struct NetworkBackend {
    resolver: TokioResolver,
    config: Arc<Config>,
}

impl NetworkBackend {
    pub fn new(config: Arc<Config>) -> Result<Self, LookupError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = config.dns_timeout();
        opts.attempts = 1;

        let resolver = TokioResolver::builder_tokio()
            .map_err(|e| LookupError::Dns(format!("failed to read system resolver config: {}", e)))?
            .with_options(opts)
            .build();

        info!(
            "NetworkBackend initialized (dns timeout {}s, whois timeout {}s)",
            config.dns_timeout_seconds, config.whois_timeout_seconds
        );

        Ok(Self { resolver, config })
    }
}

#[async_trait]
impl Capabilities for NetworkBackend {
    async fn lookup_ptr(&self, ip: IpAddr, deadline: Instant) -> Result<Vec<String>, LookupError> {
        dns::resolve_ptr(&self.resolver, ip, deadline).await
    }

    fn classify(&self, user_agent: &str) -> UaClient {
        ua::classify(user_agent)
    }

    async fn whois_exchange(&self, query: &WhoisQuery, deadline: Instant) -> Result<String, LookupError> {
        whois::tcp_exchange(
            query,
            deadline,
            self.config.whois_timeout(),
            self.config.max_response_size,
        )
        .await
    }
}
