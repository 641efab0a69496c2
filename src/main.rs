use axum::{
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderValue, Method},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, time::Instant};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use myip_service::{
    config::Config, metrics, render, AggregateResult, Aggregator, HeaderSnapshot, LookupError, LookupFlags,
    LookupRequest,
};

#[derive(Clone)]
pub struct AppState {
    aggregator: Aggregator,
    config: Arc<Config>,
}

/// Query parameters accepted by the lookup routes.
#[derive(Debug, Default, Deserialize)]
struct LookupParams {
    reverse: Option<String>,
    whois: Option<String>,
    ua: Option<String>,
    /// Address family the page asked over, for the mismatch insight.
    family: Option<String>,
    /// Pretend to be this address (debug only).
    host: Option<String>,
}

/// The inbound request, reduced to what the aggregator needs.
#[derive(Debug)]
pub struct ClientRequest(pub LookupRequest);

#[axum::async_trait]
impl FromRequestParts<AppState> for ClientRequest {
    type Rejection = LookupError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        let Query(params) = Query::<LookupParams>::try_from_uri(&parts.uri)
            .map_err(|e| LookupError::Parse(format!("bad query string: {}", e)))?;

        let headers: HeaderSnapshot = parts
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut request = LookupRequest::new(remote_addr, Instant::now() + state.config.lookup_deadline());
        request.flags = LookupFlags::from_query(params.reverse.as_deref(), params.whois.as_deref(), params.ua.as_deref());
        request.host_override = params.host;
        request.family = params.family;
        request.headers = headers;
        request.user_agent = user_agent;
        request.method = parts.method.to_string();
        request.url = parts.uri.to_string();
        request.proto = format!("{:?}", parts.version);

        Ok(ClientRequest(request))
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "myip_service=info,tower_http=debug".into()),
        )
        .init();

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!("Configuration loaded successfully");

    let aggregator = Aggregator::from_config(config.clone())?;

    // Initialize metrics
    metrics::init_metrics();

    let app_state = AppState {
        aggregator,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/json", get(json_lookup))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors_layer(&config))
                .into_inner(),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("myip service listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    // Graceful shutdown handling
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for CTRL+C: {}", e);
        }
        info!("Received shutdown signal, gracefully shutting down...");
    };

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// The page at `host` fetches the JSON from both address families, so it is
/// the one origin allowed cross-origin access. Debug mode allows any origin.
fn cors_layer(config: &Config) -> CorsLayer {
    if config.debug {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = ["http", "https"]
        .iter()
        .filter_map(|scheme| HeaderValue::from_str(&format!("{}://{}", scheme, config.host)).ok())
        .collect();

    if origins.is_empty() {
        warn!("Host {:?} is not a valid origin, allowing any origin", config.host);
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
}

async fn json_lookup(
    State(state): State<AppState>,
    ClientRequest(request): ClientRequest,
) -> Result<Json<AggregateResult>, LookupError> {
    let result = lookup(&state, request, "json").await?;
    Ok(Json(result))
}

/// Plain text for command line clients, JSON for everyone else.
async fn index(
    State(state): State<AppState>,
    ClientRequest(request): ClientRequest,
) -> Result<Response, LookupError> {
    if render::is_cli_client(request.user_agent.as_deref()) {
        let result = lookup(&state, request, "text").await?;
        let body = render::to_text(&result);
        Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
    } else {
        let result = lookup(&state, request, "json").await?;
        Ok(Json(result).into_response())
    }
}

async fn lookup(state: &AppState, request: LookupRequest, format: &'static str) -> Result<AggregateResult, LookupError> {
    let start_time = std::time::Instant::now();
    metrics::increment_requests(format);

    let result = state.aggregator.aggregate(request).await?;

    metrics::record_result(&result);
    metrics::record_request_time(start_time.elapsed().as_millis() as u64);

    Ok(result)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.config.start_time.elapsed().as_secs(),
    })
}
