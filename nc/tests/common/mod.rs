//! In-process HTTP stub shared by the integration tests
//!
//! The stub answers each connection with the next scripted response and
//! records what was sent.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use nebula_console::client::HttpEngineClient;
use nebula_console::config::EngineConfig;
use nebula_console::notify::{Notification, NotificationBus};
use nebula_console::session::Session;

/// One request as the stub saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request_line: String,
    pub authorization: Option<String>,
    pub body: String,
}

pub struct Stub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Stub {
    pub async fn serve(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                if let Some(request) = read_request(&mut socket).await {
                    recorded.lock().unwrap().push(request);
                }
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{}/api/v1", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?.to_string();
    let mut content_length = 0;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(Recorded {
        request_line,
        authorization,
        body,
    })
}

pub fn client(stub: &Stub, session: Arc<Session>) -> (HttpEngineClient, broadcast::Receiver<Notification>) {
    let config = EngineConfig {
        base_url: stub.base_url.clone(),
        timeout_ms: 5_000,
        ..Default::default()
    };
    let bus = NotificationBus::default();
    let rx = bus.subscribe();
    let client = HttpEngineClient::from_config(&config, session, bus).expect("client");
    (client, rx)
}

pub fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
