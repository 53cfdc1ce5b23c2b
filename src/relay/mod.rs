//! Relay server between the voice client and the completion provider
//!
//! `POST /api/chat` re-frames the upstream token stream as chat-completion
//! SSE events. Once the stream has started, failures are reported in-band as
//! a single error event, never as an HTTP status.

mod upstream;

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use upstream::{TokenStream, UpstreamClient};

use crate::chat::ChatMessage;
use crate::chat::sse::{DONE_FRAME, delta_frame, error_frame};
use crate::config::RelayConfig;
use crate::{Error, Result};

/// In-band error reported when the upstream call fails
pub const UPSTREAM_FAILURE: &str = "Failed to get response from AI service";

/// Frames buffered between the upstream reader and the client
const FRAME_BUFFER: usize = 32;

/// Shared state for relay handlers
#[derive(Clone)]
pub struct RelayState {
    upstream: UpstreamClient,
    system_prompt: Arc<str>,
}

impl RelayState {
    /// Build relay state from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the upstream client cannot be built
    pub fn new(config: &RelayConfig) -> Result<Self> {
        Ok(Self {
            upstream: UpstreamClient::new(config)?,
            system_prompt: system_prompt(&config.assistant_name).into(),
        })
    }
}

/// System preamble asking for short, speakable answers
#[must_use]
pub fn system_prompt(assistant_name: &str) -> String {
    format!(
        "You are a helpful AI assistant named {assistant_name}. \
         Provide concise, helpful responses. \
         Do not include any technical information or special characters. \
         Your answers will be read aloud, so keep them clear and easy to understand."
    )
}

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<ChatMessage>,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Build the relay router
///
/// # Errors
///
/// Returns error if the allowed origin is not a valid header value
pub fn router(config: &RelayConfig) -> Result<Router> {
    let state = RelayState::new(config)?;

    let origin = HeaderValue::from_str(&config.allowed_origin)
        .map_err(|e| Error::Config(format!("invalid allowed origin: {e}")))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::CACHE_CONTROL]);

    Ok(routes(state).layer(cors).layer(TraceLayer::new_for_http()))
}

/// Routes without middleware
pub fn routes(state: RelayState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .with_state(state)
}

/// Run the relay until the process is stopped
///
/// # Errors
///
/// Returns error if the server fails to bind or run
pub async fn serve(config: RelayConfig) -> Result<()> {
    let router = router(&config)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("failed to bind relay: {e}")))?;

    tracing::info!(
        port = config.port,
        model = %config.model,
        origin = %config.allowed_origin,
        "relay listening"
    );

    axum::serve(listener, router)
        .await
        .map_err(|e| Error::Config(format!("relay server error: {e}")))?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn chat(
    State(state): State<RelayState>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Response, RelayError> {
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or(RelayError::MissingMessage)?;

    let mut messages = Vec::with_capacity(request.conversation_history.len() + 2);
    messages.push(ChatMessage::new("system", state.system_prompt.as_ref()));
    messages.extend(request.conversation_history);
    messages.push(ChatMessage::new("user", message));

    tracing::info!(history = messages.len() - 2, "chat request");

    let (tx, rx) = mpsc::channel::<std::result::Result<String, Infallible>>(FRAME_BUFFER);
    tokio::spawn(relay_tokens(state.upstream, messages, tx));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| RelayError::Internal(e.to_string()))
}

/// Forward upstream tokens as frames until done, failed, or the client left
async fn relay_tokens(
    upstream: UpstreamClient,
    messages: Vec<ChatMessage>,
    tx: mpsc::Sender<std::result::Result<String, Infallible>>,
) {
    let mut tokens = match upstream.stream_chat(&messages).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(error = %e, "upstream request failed");
            let _ = tx.send(Ok(error_frame(UPSTREAM_FAILURE))).await;
            return;
        }
    };

    let mut count = 0usize;
    while let Some(item) = tokens.next().await {
        let frame = match item {
            Ok(token) => delta_frame(&token),
            Err(e) => {
                tracing::error!(error = %e, tokens = count, "upstream stream failed");
                let _ = tx.send(Ok(error_frame(UPSTREAM_FAILURE))).await;
                return;
            }
        };

        if tx.send(Ok(frame)).await.is_err() {
            tracing::debug!(tokens = count, "client disconnected");
            return;
        }
        count += 1;
    }

    let _ = tx.send(Ok(DONE_FRAME.to_string())).await;
    tracing::debug!(tokens = count, "relay stream complete");
}

/// Relay API errors
#[derive(Debug)]
pub enum RelayError {
    MissingMessage,
    Internal(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let (status, error) = match self {
            Self::MissingMessage => (StatusCode::BAD_REQUEST, "Message is required"),
            Self::Internal(message) => {
                tracing::error!(error = %message, "chat endpoint error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}
