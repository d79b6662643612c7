//! WebSocket live-update delivery.
//!
//! A client subscribes to broadcast channels by name; the server keeps one
//! re-arming waiter per subscribed channel and pushes a frame each time
//! the channel fires. Unsubscribing (or hanging up) detaches the waiters.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Incoming WebSocket frame types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncomingFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

/// Outgoing notification frame.
#[derive(Debug, Serialize)]
pub struct OutgoingFrame {
    pub channel: String,
    pub payload: Value,
}

/// Handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutgoingFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("failed to serialize outgoing ws frame: {e}"),
            }
        }
    });

    let mut forwarders: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame: IncomingFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("ignoring malformed ws frame: {e}");
                continue;
            }
        };

        match frame {
            IncomingFrame::Subscribe { channel } => {
                if forwarders.contains_key(&channel) {
                    continue;
                }
                tracing::debug!(channel = %channel, "ws subscribe");
                forwarders.insert(
                    channel.clone(),
                    spawn_forwarder(state.hub.clone(), channel, out_tx.clone()),
                );
            }
            IncomingFrame::Unsubscribe { channel } => {
                tracing::debug!(channel = %channel, "ws unsubscribe");
                if let Some(task) = forwarders.remove(&channel) {
                    task.abort();
                }
            }
        }
    }

    for task in forwarders.into_values() {
        task.abort();
    }
    writer.abort();
}

/// One re-arming waiter: receive a payload, push the frame, re-subscribe.
fn spawn_forwarder(
    hub: Arc<daybook_channels::ChannelHub>,
    channel: String,
    out: mpsc::UnboundedSender<OutgoingFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut subscription = hub.subscribe(&channel);
            match subscription.recv().await {
                Some(payload) => {
                    let frame = OutgoingFrame {
                        channel: channel.clone(),
                        payload,
                    };
                    if out.send(frame).is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    })
}
