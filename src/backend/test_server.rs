//! Canned-response HTTP server for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub struct TestServer {
    pub base: String,
    pub hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn response(status: &str, headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        headers,
        body.len(),
        body
    )
}

pub fn ok(body: &str) -> String {
    response("200 OK", "Content-Type: image/jpeg\r\n", body)
}

pub fn json(body: &str) -> String {
    response("200 OK", "Content-Type: application/json\r\n", body)
}

pub fn redirect_to(status: &str, location: &str) -> String {
    response(status, &format!("Location: {}\r\n", location), "")
}

fn not_found() -> String {
    response("404 Not Found", "", "not found")
}

/// Answers each request with the canned response for its path, 404 for
/// anything else. `{base}` in a response is replaced with the server's own
/// address.
pub async fn serve(routes: Vec<(&str, String)>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let routes: HashMap<String, String> = routes
        .into_iter()
        .map(|(path, response)| (path.to_string(), response.replace("{base}", &base)))
        .collect();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
            let response = routes.get(&path).cloned().unwrap_or_else(not_found);
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    TestServer { base, hits }
}
