//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use relay_client::config::TransportConfig;
use relay_client::params::ParamContainer;
use relay_client::response::{ResponseHead, TransportResource};
use relay_client::transport::TransportError;
use relay_client::{RequestDescriptor, ResponseDescriptor, Transport};

/// A request as the mock backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What the mock backend does with a request.
pub enum Reply {
    /// Write these bytes and close.
    Raw(Vec<u8>),
    /// Wait, then write the bytes and close.
    Delayed(Duration, Vec<u8>),
    /// Write the bytes, then hold the connection open without finishing.
    Stall(Vec<u8>),
    /// Write the bytes and keep the connection until the client closes it.
    KeepAlive(Vec<u8>),
}

/// Raw TCP mock backend speaking just enough HTTP/1.1.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    disconnects: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Keep-alive connections the client has closed.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_backend<F>(reply: F) -> MockBackend
where
    F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let reply = Arc::new(reply);

    let seen = requests.clone();
    let closed = disconnects.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let reply = reply.clone();
            let seen = seen.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                serve(socket, reply.as_ref(), &seen, &closed).await;
            });
        }
    });

    MockBackend {
        addr,
        requests,
        disconnects,
    }
}

async fn serve<F>(mut socket: TcpStream, reply: &F, seen: &Mutex<Vec<Recorded>>, closed: &AtomicUsize)
where
    F: Fn(&Recorded) -> Reply,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let action = reply(&request);
    seen.lock().unwrap().push(request);

    match action {
        Reply::Raw(bytes) => {
            let _ = socket.write_all(&bytes).await;
        }
        Reply::Delayed(delay, bytes) => {
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(&bytes).await;
        }
        Reply::Stall(bytes) => {
            let _ = socket.write_all(&bytes).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Reply::KeepAlive(bytes) => {
            let _ = socket.write_all(&bytes).await;
            let mut sink = [0u8; 1024];
            while let Ok(n) = socket.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
            closed.fetch_add(1, Ordering::SeqCst);
            return;
        }
    }
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
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

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut start = lines.next()?.split(' ');
    let method = start.next()?.to_string();
    let target = start.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let chunked = headers
        .iter()
        .any(|(n, v)| n.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked"));
    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    if chunked {
        while !body.ends_with(b"0\r\n\r\n") {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body = dechunk(&body);
    } else {
        while body.len() < length {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    }

    Some(Recorded {
        method,
        target,
        headers,
        body,
    })
}

fn dechunk(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(line_end) = rest.windows(2).position(|w| w == b"\r\n") {
        let size = std::str::from_utf8(&rest[..line_end])
            .ok()
            .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
            .unwrap_or(0);
        let start = line_end + 2;
        if size == 0 || rest.len() < start + size + 2 {
            break;
        }
        out.extend_from_slice(&rest[start..start + size]);
        rest = &rest[start + size + 2..];
    }
    out
}

/// A complete response with `Content-Length` and `Connection: close`.
pub fn response(status: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// A complete response that leaves the connection open for reuse.
pub fn keep_alive_response(status: u16, reason: &str, body: &[u8]) -> Vec<u8> {
    let mut bytes = format!("HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn transport_config(base_url: &str) -> TransportConfig {
    TransportConfig {
        base_urls: vec![base_url.to_string()],
        connect_timeout_ms: 1_000,
        read_timeout_ms: 2_000,
        ..TransportConfig::default()
    }
}

/// Fake transport: answers every call with a canned response and counts
/// calls and resource releases.
#[derive(Debug)]
pub struct CountingTransport {
    pub calls: AtomicUsize,
    pub releases: Arc<AtomicUsize>,
    pub requests: Mutex<Vec<RequestDescriptor>>,
    status: u16,
    headers: Vec<(String, String)>,
    body: &'static str,
}

impl CountingTransport {
    pub fn new(status: u16, headers: &[(&str, &str)], body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
            status,
            headers: headers.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
            body,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

struct CountingResource(Arc<AtomicUsize>);

impl TransportResource for CountingResource {
    fn release(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for CountingTransport {
    async fn call(&self, request: &RequestDescriptor) -> Result<ResponseDescriptor, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let mut headers = ParamContainer::new();
        for (name, value) in &self.headers {
            headers.add_one(name, value.clone()).unwrap();
        }
        let head = ResponseHead::new(self.status, "Fake", headers);
        Ok(ResponseDescriptor::from_bytes(head, self.body)
            .with_resource(Box::new(CountingResource(self.releases.clone()))))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}
