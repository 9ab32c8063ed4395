//! A minimal HTTP/1.1 stub server for exercising `undr`'s download path
//! without a real dataset server. One thread per connection; routes are a
//! fixed map baked in at construction time.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct Route {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    /// Whether this route honors `Range` with a 206; if false, a `Range`
    /// request still gets a full 200 body (models S3's range-rejecting server).
    pub accepts_range: bool,
}

impl Route {
    pub fn json(body: impl Into<String>) -> Self {
        Route {
            body: body.into().into_bytes(),
            content_type: "application/json",
            accepts_range: false,
        }
    }

    pub fn bytes(body: Vec<u8>, accepts_range: bool) -> Self {
        Route {
            body,
            content_type: "application/octet-stream",
            accepts_range,
        }
    }
}

pub struct StubServer {
    pub base_url: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start(routes: HashMap<String, Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let port = listener.local_addr().unwrap().port();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_loop = stop.clone();
        let routes = Arc::new(routes);

        let handle = std::thread::spawn(move || loop {
            if stop_loop.load(Ordering::SeqCst) {
                return;
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    let routes = routes.clone();
                    std::thread::spawn(move || serve_one(stream, &routes));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(_) => return,
            }
        });

        StubServer {
            base_url: format!("http://127.0.0.1:{port}"),
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_one(mut stream: TcpStream, routes: &HashMap<String, Route>) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let text = String::from_utf8_lossy(&data);
    let mut lines = text.lines();
    let request_line = lines.next().unwrap_or("");
    let path = request_line.split_whitespace().nth(1).unwrap_or("/");

    let mut range: Option<(u64, Option<u64>)> = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("range: bytes=") {
            if let Some((start, end)) = value.trim().split_once('-') {
                let start: u64 = start.parse().unwrap_or(0);
                let end = if end.is_empty() { None } else { end.parse().ok() };
                range = Some((start, end));
            }
        }
    }

    let response = match routes.get(path) {
        None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec(),
        Some(route) => match range.filter(|_| route.accepts_range) {
            Some((start, end)) => {
                let len = route.body.len() as u64;
                let start = start.min(len.saturating_sub(1));
                let end = end.unwrap_or(len.saturating_sub(1)).min(len.saturating_sub(1));
                let slice = &route.body[start as usize..=end as usize];
                let mut head = format!(
                    "HTTP/1.1 206 Partial Content\r\nContent-Type: {}\r\nContent-Range: bytes {start}-{end}/{len}\r\nContent-Length: {}\r\n\r\n",
                    route.content_type,
                    slice.len(),
                )
                .into_bytes();
                head.extend_from_slice(slice);
                head
            }
            None => {
                let mut head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
                    route.content_type,
                    route.body.len(),
                )
                .into_bytes();
                head.extend_from_slice(&route.body);
                head
            }
        },
    };

    let _ = stream.write_all(&response);
    let _ = stream.flush();
}

pub fn sha3_224_hex(data: &[u8]) -> String {
    use sha3::{Digest, Sha3_224};
    Sha3_224::digest(data).iter().map(|b| format!("{b:02x}")).collect()
}

pub fn empty_manifest() -> String {
    r#"{"version":"1.0","metadata":{},"directories":[],"files":[],"other_files":[]}"#.to_string()
}

/// A manifest with one `other_files` entry named `name`, decompressed body
/// `body`, `none` compression (so the suffixed and raw names are identical).
pub fn manifest_with_one_file(name: &str, body: &[u8]) -> String {
    let hash = sha3_224_hex(body);
    format!(
        r#"{{"version":"1.0","metadata":{{}},"directories":[],"files":[],"other_files":[{{
            "name":"{name}","size":{size},"hash":"{hash}","metadata":{{}},
            "compressions":[{{"type":"none","suffix":"","size":{size},"hash":"{hash}"}}],
            "properties":{{"type":"other"}}
        }}]}}"#,
        size = body.len(),
    )
}
