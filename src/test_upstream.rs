//! Local HTTP upstream for tests. Speaks just enough HTTP/1.1 to answer one
//! GET per connection with a canned reply, or to misbehave on purpose.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone)]
pub enum UpstreamBehavior {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        send_length: bool,
    },
    /// Accept, read the request, never answer.
    Hang,
    /// Send headers and part of the body, then go quiet.
    StallBody,
}

impl UpstreamBehavior {
    pub fn respond(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        UpstreamBehavior::Respond {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
            send_length: true,
        }
    }

    /// Body delimited by connection close.
    pub fn respond_unsized(status: u16, body: Vec<u8>) -> Self {
        UpstreamBehavior::Respond {
            status,
            headers: vec![("Connection".to_string(), "close".to_string())],
            body,
            send_length: false,
        }
    }

    pub fn redirect(location: &str) -> Self {
        UpstreamBehavior::Respond {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
            send_length: true,
        }
    }
}

pub struct TestUpstream {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    request_lines: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestUpstream {
    pub async fn start(behavior: UpstreamBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let request_lines = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn({
            let connections = connections.clone();
            let closed = closed.clone();
            let request_lines = request_lines.clone();
            async move {
                let mut handlers = JoinSet::new();
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    handlers.spawn(serve(
                        stream,
                        behavior.clone(),
                        request_lines.clone(),
                        closed.clone(),
                    ));
                }
            }
        });

        Self {
            addr,
            connections,
            closed,
            request_lines,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Connections the client side has closed while we were waiting on it.
    pub fn closed_by_peer(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn request_lines(&self) -> Vec<String> {
        self.request_lines.lock().await.clone()
    }
}

impl Drop for TestUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listener with a full accept queue. New SYNs are dropped, so a connect
/// to it neither succeeds nor gets refused.
pub struct SaturatedListener {
    addr: SocketAddr,
    _listener: TcpListener,
    fillers: Vec<JoinHandle<()>>,
}

impl SaturatedListener {
    pub async fn start() -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        // never accepted; the first ones fill the queue, the rest hang in SYN_SENT
        let fillers = (0..4)
            .map(|_| {
                tokio::spawn(async move {
                    let _stream = TcpStream::connect(addr).await;
                    std::future::pending::<()>().await;
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr,
            _listener: listener,
            fillers,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for SaturatedListener {
    fn drop(&mut self) {
        for filler in &self.fillers {
            filler.abort();
        }
    }
}

async fn serve(
    mut stream: TcpStream,
    behavior: UpstreamBehavior,
    request_lines: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
) {
    let Some(head) = read_head(&mut stream).await else {
        return;
    };
    if let Some(line) = head.lines().next() {
        request_lines.lock().await.push(line.to_string());
    }

    match behavior {
        UpstreamBehavior::Respond {
            status,
            headers,
            body,
            send_length,
        } => {
            let mut out = format!("HTTP/1.1 {status} Canned\r\n");
            for (name, value) in headers {
                out.push_str(&format!("{name}: {value}\r\n"));
            }
            if send_length {
                out.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            out.push_str("\r\n");
            let _ = stream.write_all(out.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }
        UpstreamBehavior::Hang => {
            wait_for_peer_close(&mut stream, &closed).await;
        }
        UpstreamBehavior::StallBody => {
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\npartial")
                .await;
            wait_for_peer_close(&mut stream, &closed).await;
        }
    }
}

async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

async fn wait_for_peer_close(stream: &mut TcpStream, closed: &AtomicUsize) {
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => {
                closed.fetch_add(1, Ordering::SeqCst);
                return;
            }
            Ok(_) => {}
        }
    }
}
