//! axum binding for [`WebhookReceiver`]

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tracing::instrument;

use crate::webhook::receiver::WebhookReceiver;

/// `POST` handler: the raw body is passed through untouched so the
/// signature is computed over exactly what was sent.
#[instrument(skip_all)]
pub async fn webhook_handler(
    State(receiver): State<Arc<WebhookReceiver>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match receiver.handle(&headers, &body) {
        Ok(ack) => ack.into_response(),
        Err(err) => err.into_response(),
    }
}

/// Router with the webhook mounted at `path`.
pub fn webhook_router(receiver: Arc<WebhookReceiver>, path: &str) -> Router {
    Router::new()
        .route(path, post(webhook_handler))
        .with_state(receiver)
}
