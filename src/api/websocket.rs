//! WebSocket push feed

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::{api::state::ApiState, broadcast::BroadcastHub};

/// WebSocket upgrade handler
///
/// GET / and GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state.hub))
}

/// Forward every broadcast payload to one connected client
async fn handle_websocket(socket: WebSocket, hub: BroadcastHub) {
    // registering queues the latest snapshot, so it is the first frame the client sees
    let mut subscription = hub.subscribe();
    let id = subscription.id();
    info!("subscriber {id} connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            if sender.send(Message::Text(payload.to_string())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                return;
            }
        }

        // the hub let go of this subscriber
        let _ = sender.send(Message::Close(None)).await;
    });

    // clients are not expected to send anything but pings and a close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("subscriber {id} disconnected");
}
