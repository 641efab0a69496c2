use crate::{backend::Capabilities, cleaner, errors::LookupError};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::{timeout_at, Instant},
};
use tracing::{debug, warn};

/// Root registry asked first; it refers us to the regional registry.
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";

pub const WHOIS_PORT: u16 = 43;

/// Key in the IANA response naming the authoritative server.
const REFERRAL_KEY: &str = "whois:";

/// ARIN answers "Query terms are ambiguous" unless the query is prefixed
/// with the `n` (network) directive.
const ARIN_WHOIS_SERVER: &str = "whois.arin.net";
const ARIN_QUERY_PREFIX: &str = "n ";

const READ_CHUNK_SIZE: usize = 8192;

/// One whois exchange: what to ask, and whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoisQuery {
    pub query: String,
    pub server: String,
    pub port: u16,
}

impl WhoisQuery {
    pub fn new(query: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            server: server.into(),
            port: WHOIS_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// The line sent on the wire, including any server specific directive.
    pub fn to_request(&self) -> Result<String, LookupError> {
        let server = self.server.trim();
        let query = self.query.trim();

        if server.is_empty() {
            return Err(LookupError::InvalidQuery("empty whois server".to_string()));
        }
        if query.is_empty() {
            return Err(LookupError::InvalidQuery("empty query".to_string()));
        }
        if query.contains(|c: char| c == '\r' || c == '\n') {
            return Err(LookupError::InvalidQuery(format!("query contains a line break: {:?}", query)));
        }

        if server.eq_ignore_ascii_case(ARIN_WHOIS_SERVER) {
            Ok(format!("{}{}\r\n", ARIN_QUERY_PREFIX, query))
        } else {
            Ok(format!("{}\r\n", query))
        }
    }
}

/// Whois data sent to the user. Exactly one of `body` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisResult {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WhoisResult {
    pub fn success(query: &str, body: String) -> Self {
        Self {
            query: query.to_string(),
            body: Some(body),
            error: None,
        }
    }

    pub fn failure(query: &str, error: &LookupError) -> Self {
        Self {
            query: query.to_string(),
            body: None,
            error: Some(error.to_string()),
        }
    }
}

/// Splits a whois response into key/value pairs. Comment lines (`%`) are
/// skipped, the first two whitespace separated tokens of a line are the key
/// and value, and a later duplicate key replaces an earlier one.
pub fn parse_whois(response: &str) -> HashMap<&str, &str> {
    let mut fields = HashMap::new();

    for line in response.lines() {
        if line.starts_with('%') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        if let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
            fields.insert(key, value);
        }
    }

    fields
}

/// The server a root response refers us to, if any.
pub fn find_referral(response: &str) -> Option<String> {
    parse_whois(response)
        .get(REFERRAL_KEY)
        .map(|server| server.to_string())
}

/// Resolves whois data for an address in two steps: ask the root registry
/// who is responsible, then ask that server.
#[derive(Clone)]
pub struct WhoisResolver {
    backend: Arc<dyn Capabilities>,
    root_server: String,
}

impl WhoisResolver {
    pub fn new(backend: Arc<dyn Capabilities>) -> Self {
        Self {
            backend,
            root_server: IANA_WHOIS_SERVER.to_string(),
        }
    }

    pub fn with_root_server(mut self, server: impl Into<String>) -> Self {
        self.root_server = server.into();
        self
    }

    /// Never fails; errors are reported inside the returned result.
    pub async fn resolve(&self, address: &str, deadline: Instant) -> WhoisResult {
        match self.query_with_referral(address, deadline).await {
            Ok(body) => WhoisResult::success(address, cleaner::clean(&body)),
            Err(e) => {
                warn!("Whois lookup for {} failed: {}", address, e);
                WhoisResult::failure(address, &e)
            }
        }
    }

    async fn query_with_referral(&self, address: &str, deadline: Instant) -> Result<String, LookupError> {
        let root = WhoisQuery::new(address, self.root_server.as_str());
        let response = self.backend.whois_exchange(&root, deadline).await?;

        let server = find_referral(&response)
            .ok_or_else(|| LookupError::NoReferralFound(address.to_string()))?;

        debug!("Following referral for {} from {} to {}", address, self.root_server, server);

        let referred = WhoisQuery::new(address, server);
        self.backend.whois_exchange(&referred, deadline).await
    }
}

/// Sends `query` to its server over TCP and reads until the server closes.
///
/// The whole exchange is bounded by `exchange_timeout` and by `deadline`,
/// whichever comes first.
pub async fn tcp_exchange(
    query: &WhoisQuery,
    deadline: Instant,
    exchange_timeout: Duration,
    max_response_size: usize,
) -> Result<String, LookupError> {
    let request = query.to_request()?;
    let limit = deadline.min(Instant::now() + exchange_timeout);

    debug!("Whois request {:?} to {}", query.query, query.server);

    let response = timeout_at(limit, async {
        let mut stream = TcpStream::connect((query.server.as_str(), query.port)).await?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        stream.write_all(request.as_bytes()).await?;

        let mut response = Vec::new();
        let mut buffer = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = stream.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buffer[..n]);
            if response.len() > max_response_size {
                return Err(LookupError::ResponseTooLarge);
            }
        }

        Ok::<_, LookupError>(response)
    })
    .await??;

    debug!("Whois response from {}: {} bytes", query.server, response.len());

    String::from_utf8(response).map_err(|_| LookupError::InvalidUtf8)
}
