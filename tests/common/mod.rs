//! Minimal canned-response HTTP server for offline tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Route {
    /// Matched against the request target (path plus query)
    pub path_contains: &'static str,
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Route {
    pub fn json(path_contains: &'static str, status: u16, body: serde_json::Value) -> Self {
        Self {
            path_contains,
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn sse(path_contains: &'static str, events: &[serde_json::Value]) -> Self {
        let body = events
            .iter()
            .map(|e| format!("data: {}\r\n\r\n", e))
            .collect::<String>();
        Self {
            path_contains,
            status: 200,
            content_type: "text/event-stream",
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub target: String,
    /// Raw header block, lowercased
    pub headers: String,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Serve `routes` on an ephemeral port until the test runtime ends
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, &routes, &recorded).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: &[Route],
    recorded: &Mutex<Vec<Recorded>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let headers = head.to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string();
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    recorded.lock().unwrap().push(Recorded {
        target: target.clone(),
        headers,
        body,
    });

    let route = routes.iter().find(|r| target.contains(r.path_contains));
    let (status, content_type, body) = match route {
        Some(r) => (r.status, r.content_type, r.body.clone()),
        None => (404, "text/plain", "no route".to_string()),
    };

    let head = format!(
        "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;

    // Two writes with a pause so streaming readers see a split body
    let bytes = body.as_bytes();
    let mid = bytes.len() / 2;
    socket.write_all(&bytes[..mid]).await?;
    socket.flush().await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    socket.write_all(&bytes[mid..]).await?;
    socket.shutdown().await?;
    Ok(())
}
