//! Server-push WebSocket plumbing.
//!
//! A socket is driven by two tasks:
//!
//! ```text
//! frames (Stream) ──> send task ──> client
//!                        ^
//!                        │ pong
//! client ──> recv task ──┘
//! ```
//!
//! Whichever task finishes first aborts the other: a client close ends the
//! push loop, and an exhausted frame stream closes the socket.
//!
//! # Message Protocol
//!
//! **Server → Client:**
//! ```json
//! { "type": "snapshot", "data": { ... } }
//! { "type": "change", "data": { ... } }
//! { "type": "error", "message": "Live updates interrupted" }
//! { "type": "pong" }
//! ```
//!
//! **Client → Server:**
//! ```json
//! { "type": "ping" }
//! ```

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsMessage<T> {
    /// Full state sent once after connecting
    Snapshot {
        /// The state
        data: T,
    },
    /// Incremental change
    Change {
        /// The change
        data: T,
    },
    /// Server-side failure; the stream ends after this
    Error {
        /// Error description
        message: String,
    },
    /// Keep-alive from the client
    Ping,
    /// Keep-alive reply
    Pong,
}

/// Push `frames` to `socket` until either side finishes.
pub async fn pump<T, F>(socket: WebSocket, frames: F)
where
    T: Serialize + for<'de> Deserialize<'de> + Send + 'static,
    F: Stream<Item = WsMessage<T>> + Send + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    let (pong_tx, mut pong_rx) = mpsc::channel::<()>(8);

    let mut send_task = tokio::spawn(async move {
        let mut frames = Box::pin(frames);
        loop {
            let frame = tokio::select! {
                next = frames.next() => match next {
                    Some(frame) => frame,
                    None => break,
                },
                Some(()) = pong_rx.recv() => WsMessage::Pong,
            };

            let text = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize frame");
                    continue;
                },
            };

            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
        debug!("WebSocket send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WsMessage<T>>(&text) {
                    Ok(WsMessage::Ping) => {
                        if pong_tx.send(()).await.is_err() {
                            break;
                        }
                    },
                    Ok(_) => warn!("Unexpected message type from client"),
                    Err(e) => warn!(error = %e, "Failed to parse WebSocket message"),
                },
                Message::Close(_) => {
                    debug!("Client requested close");
                    break;
                },
                Message::Binary(_) => warn!("Received unexpected binary message"),
                Message::Ping(_) | Message::Pong(_) => {},
            }
        }
        debug!("WebSocket receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("WebSocket connection closed");
}
