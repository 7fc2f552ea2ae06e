//! WebSocket transport connector
//!
//! Opens the connection URL and reports connect/disconnect. Frames are left
//! to the protocol client sitting on top; this connector only tracks liveness.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;
use vmdesk_common::Result;

use crate::transport::{EventSink, TransportConnector, TransportEvent, TransportHandle, TransportStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl TransportConnector for WebSocketConnector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn TransportHandle>> {
        let status = Arc::new(Mutex::new(TransportStatus::Connecting));
        let task = tokio::spawn(run(url.clone(), events, status.clone()));
        Ok(Box::new(WebSocketHandle { status, task }))
    }
}

struct WebSocketHandle {
    status: Arc<Mutex<TransportStatus>>,
    task: JoinHandle<()>,
}

impl TransportHandle for WebSocketHandle {
    fn status(&self) -> TransportStatus {
        *self.status.lock()
    }

    fn send_credentials(&self, _password: &str) {
        debug!("WebSocket transport does not negotiate credentials in-band");
    }

    fn close(&self) {
        self.task.abort();
        *self.status.lock() = TransportStatus::Closed;
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(url: Url, events: EventSink, status: Arc<Mutex<TransportStatus>>) {
    let redacted = redact(&url);
    debug!("Opening transport to {}", redacted);

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!("Transport connect to {} failed: {}", redacted, e);
            *status.lock() = TransportStatus::Closed;
            let _ = events.send(TransportEvent::Disconnected { clean: false });
            return;
        }
    };

    *status.lock() = TransportStatus::Connected;
    let _ = events.send(TransportEvent::Connected);

    let (_write, mut read) = stream.split();
    let clean = loop {
        match read.next().await {
            Some(Ok(Message::Close(frame))) => {
                debug!("Transport closed by server: {:?}", frame);
                break true;
            }
            Some(Ok(msg)) => trace!("Transport frame: {} bytes", msg.len()),
            Some(Err(e)) => {
                warn!("Transport error on {}: {}", redacted, e);
                break false;
            }
            None => break false,
        }
    };

    *status.lock() = TransportStatus::Closed;
    let _ = events.send(TransportEvent::Disconnected { clean });
}

/// The URL with the password query value masked, for logs.
pub fn redact(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "password" && !v.is_empty() {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    if pairs.is_empty() {
        return masked.to_string();
    }
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
