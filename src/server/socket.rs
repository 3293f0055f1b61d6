//! Socket transport for subscriptions. Inbound text frames carry
//! `{type: "sub" | "unsub", target}`, outbound frames carry endpoint results.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::runtime::{Dashboard, Subscriber};
use crate::server::server::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.dashboard))
}

async fn handle_socket(socket: WebSocket, dashboard: Dashboard) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscriber = Subscriber::new(tx);
    debug!(socket = subscriber.id(), "socket connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dashboard
                    .subscriptions()
                    .handle_message(text.as_str(), &subscriber)
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(socket = subscriber.id(), error = %err, "socket error");
                break;
            }
        }
    }

    dashboard.subscriptions().clear_socket(subscriber.id()).await;
    writer.abort();
    debug!(socket = subscriber.id(), "socket closed");
}
