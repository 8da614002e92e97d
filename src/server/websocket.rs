//! WebSocket upgrade handling and per-channel message loop
//!
//! Routes:
//! - `/`: upgrade endpoint, authorized through the configured `Authorizer`
//! - `/token`: built-in check route (only when an expected token is configured)
//! - `/health`: liveness probe
//!
//! Any other path, and any upgrade attempt on a non-upgrade route, gets a
//! plain-text 404 and the connection is closed.

use crate::auth::{display_token, extract_token, Authorizer, ExpectedToken};
use crate::channels::{decode_binary, echo_reply, Channel};
use crate::error::{GatewayError, Result};
use crate::server::connections::ChannelRegistry;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        RawQuery, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The single recognized upgrade path
pub const UPGRADE_PATH: &str = "/";

/// Path of the built-in token check route
pub const TOKEN_CHECK_PATH: &str = "/token";

/// How long a closing channel waits for its writer to finish the close handshake
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Shared state for the HTTP and WebSocket handlers
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ChannelRegistry>,
    pub authorizer: Arc<dyn Authorizer>,
    pub expected_token: Option<ExpectedToken>,
    pub auth_timeout: Duration,
    pub outbound_buffer: usize,
}

/// Create the gateway router
pub fn create_router(state: GatewayState) -> Router {
    let mut router = Router::new()
        .route(UPGRADE_PATH, get(upgrade_handler))
        .route("/health", get(health_handler));

    if state.expected_token.is_some() {
        router = router.route(TOKEN_CHECK_PATH, get(token_check_handler));
    }

    router.fallback(fallback_handler).with_state(state)
}

/// Plain-text rejection that also asks the server to drop the connection
pub fn reject(error: &GatewayError) -> Response {
    (
        error.status(),
        [(header::CONTENT_TYPE, "text/plain"), (header::CONNECTION, "close")],
        error.rejection_body(),
    )
        .into_response()
}

/// Run one bounded authorization check. Every failure mode is a rejection.
pub async fn authorize(authorizer: &dyn Authorizer, token: &str, limit: Duration) -> Result<()> {
    match timeout(limit, authorizer.check_token(token)).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(GatewayError::AuthorizationDenied),
        Ok(Err(GatewayError::AuthorizationUnavailable(reason))) => {
            Err(GatewayError::AuthorizationUnavailable(reason))
        }
        Ok(Err(other)) => Err(GatewayError::AuthorizationUnavailable(other.to_string())),
        Err(_) => Err(GatewayError::AuthorizationUnavailable(format!(
            "no verdict within {:?}",
            limit
        ))),
    }
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
}

async fn upgrade_handler(
    State(state): State<GatewayState>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> Response {
    let token = extract_token(query.as_deref());

    if let Err(e) = authorize(state.authorizer.as_ref(), &token, state.auth_timeout).await {
        warn!(token = display_token(&token), error = %e, "Upgrade rejected");
        return reject(&e);
    }

    let (tx, rx) = mpsc::channel(state.outbound_buffer);
    let channel = Arc::new(Channel::new(token, tx));
    let failed_token = display_token(channel.token()).to_string();
    let registry = state.registry.clone();

    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!(token = %failed_token, error = %e, "WebSocket handshake failed");
    })
    .on_upgrade(move |socket| serve_channel(socket, channel, rx, registry))
}

async fn token_check_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    if is_upgrade_request(&headers) {
        return reject(&GatewayError::RouteNotFound(TOKEN_CHECK_PATH.to_string()));
    }

    let token = extract_token(query.as_deref());
    let authorized = state
        .expected_token
        .as_ref()
        .is_some_and(|expected| expected.matches(&token));

    if authorized {
        (StatusCode::OK, "1").into_response()
    } else {
        (StatusCode::BAD_REQUEST, "0").into_response()
    }
}

async fn health_handler(headers: HeaderMap) -> Response {
    if is_upgrade_request(&headers) {
        return reject(&GatewayError::RouteNotFound("/health".to_string()));
    }
    "ok".into_response()
}

async fn fallback_handler(uri: Uri) -> Response {
    let error = GatewayError::RouteNotFound(uri.path().to_string());
    debug!(path = uri.path(), "Route not found");
    reject(&error)
}

/// Service one open channel until its transport closes
async fn serve_channel(
    socket: WebSocket,
    channel: Arc<Channel>,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ChannelRegistry>,
) {
    let (mut sender, mut receiver) = socket.split();

    if !registry.register(channel.clone()) {
        warn!(channel_id = %channel.id(), state = %channel.state(), "Channel not registered");
        return;
    }

    let channel_id = channel.id();
    info!(channel_id = %channel_id, token = channel.display_token(), "Channel opened");

    // Forward queued replies and broadcasts to the socket until told to stop,
    // then close the sink so a pending close reply is flushed
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                queued = rx.recv() => match queued {
                    Some(text) => {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
                _ = &mut stop_rx => break,
            }
        }
        let _ = sender.close().await;
    });

    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => reply(&channel, text.as_str()).await,
            Ok(Message::Binary(data)) => match decode_binary(&data) {
                Ok(text) => reply(&channel, text).await,
                Err(e) => {
                    warn!(channel_id = %channel_id, token = channel.display_token(), error = %e, "Dropping inbound frame");
                }
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pong replies are queued by the protocol layer and go out
                // with the next outbound frame
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                let error = GatewayError::Transport(e.to_string());
                warn!(channel_id = %channel_id, token = channel.display_token(), error = %error, "WebSocket error");
                break;
            }
        }
    }

    close_channel(&channel, &registry);

    let _ = stop_tx.send(());
    if timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
        debug!(channel_id = %channel_id, "Writer did not finish closing");
        send_task.abort();
    }
}

async fn reply(channel: &Channel, text: &str) {
    debug!(channel_id = %channel.id(), token = channel.display_token(), payload = text, "Received message");

    if let Err(e) = channel.send(echo_reply(text)).await {
        debug!(channel_id = %channel.id(), error = %e, "Reply not sent");
    }
}

/// Move the channel to `Closed` and drop it from the registry.
/// Safe to call any number of times.
fn close_channel(channel: &Channel, registry: &ChannelRegistry) {
    let closed = channel.close();
    let removed = registry.remove(channel.id());

    if closed || removed {
        info!(channel_id = %channel.id(), token = channel.display_token(), "Channel closed");
    }
}
