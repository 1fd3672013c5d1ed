//! Fake HTTP server for fetcher tests
//!
//! A plain HTTP/1.1 listener on localhost that serves fixed routes:
//! redirects, images and pages. Unknown paths get `404`. Every request
//! is recorded with its method and `Referer` so tests can check what
//! the client sent. Connections are closed after one response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
enum Route {
    Redirect(String),
    Body {
        content_type: Option<String>,
        bytes: Vec<u8>,
    },
}

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub referer: Option<String>,
}

#[derive(Default)]
pub struct RoutesBuilder {
    routes: HashMap<String, Route>,
}

impl RoutesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `302 Found` to `location`, which may be absolute or a path.
    pub fn redirect(mut self, path: &str, location: &str) -> Self {
        self.routes
            .insert(path.to_string(), Route::Redirect(location.to_string()));
        self
    }

    pub fn body(mut self, path: &str, content_type: Option<&str>, bytes: &[u8]) -> Self {
        self.routes.insert(
            path.to_string(),
            Route::Body {
                content_type: content_type.map(str::to_string),
                bytes: bytes.to_vec(),
            },
        );
        self
    }
}

pub struct FakeHttpServer {
    port: u16,
    requests: Arc<Mutex<Vec<Request>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeHttpServer {
    pub async fn start(routes: RoutesBuilder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();
        let routes = Arc::new(routes.routes);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _addr)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    serve(stream, &routes, &log).await;
                });
            }
        });

        Self {
            port,
            requests,
            _handle: handle,
        }
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

/// Answer one request. It is logged before the response goes out so a
/// client that has its answer also sees the log entry.
async fn serve(
    stream: TcpStream,
    routes: &HashMap<String, Route>,
    log: &Mutex<Vec<Request>>,
) -> Option<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut referer = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("referer")
        {
            referer = Some(value.trim().to_string());
        }
    }

    let route = routes.get(&path).cloned();
    log.lock().unwrap().push(Request {
        method: method.clone(),
        path,
        referer,
    });

    let (status, headers, body) = match route {
        Some(Route::Redirect(location)) => (
            "302 Found",
            vec![format!("Location: {location}")],
            Vec::new(),
        ),
        Some(Route::Body {
            content_type,
            bytes,
        }) => (
            "200 OK",
            content_type
                .iter()
                .map(|ct| format!("Content-Type: {ct}"))
                .collect(),
            bytes,
        ),
        None => ("404 Not Found", Vec::new(), b"not found".to_vec()),
    };

    let mut head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\n", body.len());
    for header in &headers {
        head.push_str(header);
        head.push_str("\r\n");
    }
    head.push_str("Connection: close\r\n\r\n");

    let stream = reader.get_mut();
    stream.write_all(head.as_bytes()).await.ok()?;
    if method != "HEAD" {
        stream.write_all(&body).await.ok()?;
    }
    stream.flush().await.ok()?;
    let _ = stream.shutdown().await;
    Some(())
}
