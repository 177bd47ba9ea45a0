//! Realtime status channel
//!
//! A blocking tungstenite reader on its own thread decodes text frames as
//! status updates and forwards them to async code over a tokio channel.
//! Dropping the [`RealtimeChannel`] stops the reader at its next poll.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket, connect};

use super::EngineError;
use super::http::encode_segment;
use crate::domain::ExecutionPlanStatus;

/// How long a read blocks before the stop flag is checked again
const READ_POLL: Duration = Duration::from_millis(250);

/// What the reader thread reports
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected,
    Status(ExecutionPlanStatus),
    /// The connection ended; `reason` is set when it failed
    Closed { reason: Option<String> },
}

/// Push channel for execution status changes
pub struct RealtimeChannel {
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RealtimeChannel {
    /// Start a reader for `ws_url`, filtered to `plan_id` when given
    ///
    /// Returns at once; connection failures arrive as [`RealtimeEvent::Closed`].
    pub fn open(ws_url: &str, plan_id: Option<&str>, token: Option<String>) -> Result<Self, EngineError> {
        let url = realtime_url(ws_url, plan_id);
        debug!(%url, "RealtimeChannel::open: called");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| EngineError::Realtime(format!("invalid url {}: {}", url, e)))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| EngineError::Realtime(format!("invalid token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_reader = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("nc-realtime".to_string())
            .spawn(move || {
                let reason = match connect(request) {
                    Ok((mut socket, _response)) => {
                        info!(%url, "realtime connected");
                        let _ = tx.send(RealtimeEvent::Connected);
                        read_loop(&mut socket, &tx, &stop_for_reader)
                    }
                    Err(e) => Some(format!("connect failed: {}", e)),
                };
                if let Some(reason) = &reason {
                    warn!(%reason, "realtime channel closed");
                }
                let _ = tx.send(RealtimeEvent::Closed { reason });
            })
            .map_err(|e| EngineError::Realtime(format!("failed to spawn reader: {}", e)))?;

        Ok(Self {
            rx,
            stop,
            handle: Some(handle),
        })
    }

    /// Next event; `None` once the reader has finished and the queue is drained
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    /// Next queued event without waiting
    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }

    /// Ask the reader to stop
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.close();
        // The reader notices within READ_POLL; do not block the caller on it.
        drop(self.handle.take());
    }
}

/// Read frames until closed, stopped, or failed; returns the failure reason
fn read_loop(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    tx: &mpsc::UnboundedSender<RealtimeEvent>,
    stop: &AtomicBool,
) -> Option<String> {
    if let Err(e) = set_read_timeout(socket) {
        return Some(format!("failed to configure stream: {}", e));
    }

    let reason = loop {
        if stop.load(Ordering::SeqCst) || tx.is_closed() {
            break None;
        }
        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<ExecutionPlanStatus>(&text) {
                Ok(status) => {
                    debug!(plan_id = %status.plan_id, status = %status.status, "realtime status update");
                    let _ = tx.send(RealtimeEvent::Status(status));
                }
                Err(e) => debug!(error = %e, "realtime frame is not a status update, skipped"),
            },
            Ok(Message::Ping(payload)) => {
                let _ = socket.send(Message::Pong(payload));
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => break None,
            Err(tungstenite::Error::Io(err)) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => break None,
            Err(e) => break Some(format!("read failed: {}", e)),
        }
    };

    let _ = socket.close(None);
    reason
}

fn set_read_timeout(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) -> std::io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(READ_POLL)),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(Some(READ_POLL)),
        _ => Ok(()),
    }
}

/// WebSocket URL with the optional `planId` filter
pub fn realtime_url(ws_url: &str, plan_id: Option<&str>) -> String {
    match plan_id {
        Some(plan_id) if !plan_id.is_empty() => {
            let sep = if ws_url.contains('?') { '&' } else { '?' };
            format!("{}{}planId={}", ws_url, sep, encode_segment(plan_id))
        }
        _ => ws_url.to_string(),
    }
}
