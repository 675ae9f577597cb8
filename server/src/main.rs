use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer,
};
use tracing::{info, warn};

use tts_core::{RealtimeTts, DEFAULT_WS_BASE};
use twin_core::{builtin_roster, LlmClient};

use server::config::ServerConfig;
use server::routes::{build_router, init_start_time};
use server::state::{AgentRegistry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting digital twin server...");

    let llm = match LlmClient::from_env() {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Chat disabled: {e}");
            None
        }
    };

    let api_key = std::env::var("ELEVEN_API_KEY")
        .or_else(|_| std::env::var("ELEVENLABS_API_KEY"))
        .ok()
        .filter(|key| !key.trim().is_empty());
    let ws_base =
        std::env::var("ELEVEN_WS_BASE").unwrap_or_else(|_| DEFAULT_WS_BASE.to_string());
    let tts = RealtimeTts::new(api_key, ws_base);
    if tts.enabled() {
        info!("Realtime speech synthesis enabled");
    } else {
        warn!("ELEVEN_API_KEY not set, speech synthesis disabled");
    }

    let registry = AgentRegistry::new(builtin_roster());
    info!(
        "Loaded {} digital twins, {} is active",
        registry.names().len(),
        registry.active_name()
    );

    init_start_time();

    // Load configuration from environment
    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, llm_timeout={}s",
        config.port, config.rate_limit_per_minute, config.llm_timeout_secs
    );

    let state = AppState::new(registry, llm, tts, config.clone());

    // CORS configuration - environment-aware
    let cors = match config.cors_allowed_origins.as_ref() {
        Some(allowed) => {
            let origins: Vec<axum::http::HeaderValue> = allowed
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
                permissive_cors()
            } else {
                info!("CORS configured for {} origin(s)", origins.len());
                CorsLayer::new()
                    .allow_origin(tower_http::cors::AllowOrigin::list(origins))
                    .allow_methods([
                        axum::http::Method::GET,
                        axum::http::Method::POST,
                        axum::http::Method::OPTIONS,
                    ])
                    .allow_headers(tower_http::cors::Any)
                    .allow_credentials(false)
            }
        }
        None => {
            warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
            permissive_cors()
        }
    };

    // Rate limiting is global rather than per-client; IP extraction is
    // unreliable behind Docker and reverse proxies.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second((config.rate_limit_per_minute / 60).max(1) as u64)
            .burst_size(config.rate_limit_per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    // Request ID middleware for tracing
    async fn add_request_id(mut request: Request, next: Next) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = axum::http::HeaderValue::from_str(&request_id) {
            request.headers_mut().insert("x-request-id", value.clone());
            let mut response = next.run(request).await;
            response.headers_mut().insert("x-request-id", value);
            return response;
        }
        next.run(request).await
    }

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors)
        .into_inner();

    let app = build_router(state)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
        .allow_credentials(false)
}
