use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use stall_sdk::objects::BroadcastMessage;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::extractors::SellerAuth;
use crate::state::AppState;

/// `GET /stores/{store_id}/ws`: live dashboard stream.
///
/// Relays the store's [`BroadcastMessage`] frames until the client
/// disconnects. A lagging connection gets a `stats_updated` frame so the
/// dashboard refetches whatever it missed.
pub(super) async fn store_ws(
    State(state): State<AppState>,
    _auth: SellerAuth,
    Path(store_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_store_signals(socket, state, store_id))
}

async fn relay_store_signals(mut socket: WebSocket, state: AppState, store_id: Uuid) {
    let mut signals = state.broadcaster.subscribe();
    tracing::debug!(%store_id, "WS: dashboard subscribed");

    loop {
        tokio::select! {
            result = signals.recv() => {
                let message = match result {
                    Ok(signal) if signal.store_id == store_id => signal.message,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%store_id, skipped, "WS: broadcast receiver lagged");
                        BroadcastMessage::StatsUpdated { store_id }
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_json(&mut socket, &message).await.is_err() {
                    return;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Serialize `value` as JSON and send it as a text frame.
///
/// Returns `Err(())` if the client is gone.
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
