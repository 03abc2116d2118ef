use crate::auth::AdminUser;
use crate::error::AppError;
use crate::rate_limit;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracking::hub::Subscription;
use types::ids::UserId;

/// `GET /ws/admin/tracking/`: live driver positions for admins
///
/// Authentication runs before the upgrade extractor so unauthenticated
/// clients get 401/403 rather than an upgrade error.
pub async fn admin_tracking(
    State(state): State<AppState>,
    admin: AdminUser,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    state
        .rate_limiter
        .check_rate_limit(&format!("{}:ws_connections", admin.user_id), rate_limit::WS_CONNECT)?;

    Ok(ws.on_upgrade(move |socket| {
        let subscription = state.hub.subscribe();
        handle_socket(socket, subscription, admin.user_id)
    }))
}

/// Forward hub frames to the socket until either side goes away.
///
/// Client messages are ignored apart from Close. The subscription is dropped
/// on return, which removes the session from the hub on every exit path.
async fn handle_socket(socket: WebSocket, mut subscription: Subscription, admin: UserId) {
    let observer = subscription.id();
    tracing::info!(observer = %observer, admin = %admin, "Tracking observer connected");

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            frame = subscription.recv() => {
                let Some(frame) = frame else {
                    // Evicted for lagging, or the server is shutting down.
                    tracing::debug!(observer = %observer, "Subscription closed by hub");
                    break;
                };
                if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    drop(subscription);
    tracing::info!(observer = %observer, "Tracking observer disconnected");
}
