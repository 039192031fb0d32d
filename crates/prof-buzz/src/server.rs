//! The HTTP surface of the relay.

use std::future::Future;
use std::io;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prof_buzz_core::{ChatRelay, Error, ErrorKind};
use prof_buzz_model::Message;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// The route of the chat endpoint.
pub const CHAT_ROUTE: &str = "/api/chat";

const TEXT_PLAIN_UTF_8: &str = "text/plain; charset=utf-8";

/// Creates the router serving the chat endpoint with `relay`.
pub fn router(relay: ChatRelay) -> Router {
    Router::new()
        .route(CHAT_ROUTE, post(chat))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

/// Serves the router on `listener` until `shutdown` completes.
pub async fn serve<F>(
    listener: TcpListener,
    relay: ChatRelay,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }
    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn chat(
    State(relay): State<ChatRelay>,
    Json(conversation): Json<Vec<Message>>,
) -> Result<Response, ApiError> {
    let stream = relay.respond(&conversation).await?;
    Ok((
        [(header::CONTENT_TYPE, TEXT_PLAIN_UTF_8)],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn health() -> &'static str {
    "ok"
}

/// A relay error that happened before any text was sent.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::MalformedRequest => StatusCode::BAD_REQUEST,
            ErrorKind::UpstreamEmbedding
            | ErrorKind::UpstreamRetrieval
            | ErrorKind::UpstreamCompletion
            | ErrorKind::StreamRelay => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            warn!("chat request failed: {}", self.0);
        }
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
