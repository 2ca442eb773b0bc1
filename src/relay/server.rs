//! axum front end for the relay
//!
//! Chat completions are accepted on `/`, `/v1/chat/completions` and
//! `/api/openai/chat/completions`. A `GET` on any of them (or on `/health`)
//! answers `ok`. Streaming responses are server-sent events ending in
//! `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::bridge::ClientLifetime;
use super::types::{parse_request, ApiRequest};
use super::{collect_response, Relay};
use crate::config::Config;
use crate::error::{Result, RelayError};

/// Chat completion route used by OpenAI clients.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
/// Chat completion route kept for existing integrations.
pub const OPENAI_COMPAT_PATH: &str = "/api/openai/chat/completions";
/// Liveness route.
pub const HEALTH_PATH: &str = "/health";

/// Host assumed when a request carries no `Host` header.
const FALLBACK_HOST: &str = "127.0.0.1:3000";

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Fixed upstream origin; `None` derives it from each request's host
    pub endpoint: Option<String>,
}

impl AppState {
    pub fn new(relay: Relay, endpoint: Option<String>) -> Self {
        Self {
            relay: Arc::new(relay),
            endpoint,
        }
    }

    fn endpoint_for(&self, headers: &HeaderMap) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_HOST);
        origin_from_host(host)
    }
}

/// Errors returned to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let message = err.to_string();
        match err.downcast_ref::<RelayError>() {
            Some(RelayError::InvalidRequest(_) | RelayError::InvalidCorrelationId(_)) => {
                ApiError::BadRequest(message)
            }
            Some(RelayError::SessionCreation(_)) => ApiError::Unauthorized(message),
            Some(RelayError::TurnInProgress(_)) => ApiError::Conflict(message),
            Some(RelayError::Upstream(_) | RelayError::Http(_)) => ApiError::BadGateway(message),
            _ => {
                tracing::error!("Request failed: {:#}", err);
                ApiError::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Derive the upstream origin from an inbound `Host` header
///
/// Bare IP addresses keep plain `http`; named hosts use `https`.
///
/// # Examples
///
/// ```
/// use hubrelay::relay::server::origin_from_host;
///
/// assert_eq!(origin_from_host("relay.example.com"), "https://relay.example.com");
/// assert_eq!(origin_from_host("127.0.0.1:3000"), "http://127.0.0.1:3000");
/// ```
pub fn origin_from_host(host: &str) -> String {
    let host = host.trim();
    let numeric = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':');
    if numeric {
        format!("http://{}", host)
    } else {
        format!("https://{}", host)
    }
}

/// Wrap a byte stream as a `text/event-stream` response.
pub fn sse_response<S>(stream: S) -> Response
where
    S: futures::Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}

/// Build the relay router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/", get(health).post(chat_completions))
        .route(CHAT_COMPLETIONS_PATH, get(health).post(chat_completions))
        .route(OPENAI_COMPAT_PATH, get(health).post(chat_completions))
        .route(HEALTH_PATH, get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ApiRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(request) = payload?;
    let request = parse_request(request, state.relay.default_style())?;
    let stream = request.stream;
    let endpoint = state.endpoint_for(&headers);

    let lifetime = ClientLifetime::new();
    let turn = match state.relay.start_turn(request, &endpoint, lifetime.token()).await {
        Ok(turn) => turn,
        Err(e) => {
            lifetime.complete();
            return Err(e.into());
        }
    };
    tracing::info!(stream, "Relaying turn");

    if stream {
        let body = async_stream::stream! {
            let lifetime = lifetime;
            let mut chunks = turn.chunks;
            while let Some(chunk) = chunks.next().await {
                match chunk.sse_frame() {
                    Ok(frame) => yield Ok::<Bytes, Infallible>(frame),
                    Err(e) => {
                        tracing::warn!("Failed to encode chunk: {}", e);
                        break;
                    }
                }
            }
            lifetime.complete();
        };
        return Ok(sse_response(body));
    }

    let response = collect_response(turn.chunks).await;
    lifetime.complete();
    Ok(Json(response?).into_response())
}

/// Run the relay server until Ctrl-C
///
/// # Errors
///
/// Returns error if the relay cannot be built or the address cannot be bound
pub async fn serve(config: &Config) -> Result<()> {
    let relay = Relay::from_config(config)?;
    let state = AppState::new(relay, config.upstream.endpoint.clone());
    let app = router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(RelayError::Io)?;
    tracing::info!("Relay listening on {}", listener.local_addr().map_err(RelayError::Io)?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
        .map_err(RelayError::Io)?;

    Ok(())
}
