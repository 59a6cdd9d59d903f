//! Transport implementation over an axum WebSocket.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::Mutex;

use crate::ports::{Transport, TransportError};

/// The sink half of one WebSocket connection.
///
/// Shared by the connection task, the broadcaster, and the heartbeat
/// scheduler; the sink sits behind an async mutex so concurrent sends
/// serialize. The open flag drops on close or on the first send error,
/// after which every send fails fast with [`TransportError::Closed`].
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: AtomicBool,
}

impl WsTransport {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&self, payload: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(payload.to_string().into()))
            .await
            .map_err(|error| {
                self.open.store(false, Ordering::SeqCst);
                TransportError::Send(error.to_string())
            })
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Ping(Default::default()))
            .await
            .map_err(|error| {
                self.open.store(false, Ordering::SeqCst);
                TransportError::Send(error.to_string())
            })
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(Message::Close(None)).await;
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
