//! HTTP transport for one extension service: bind, accept, route paths to CGIs.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use blockwire_core::{ExtensionService, GroupMember, Membership, ServiceError};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Largest request head accepted.
const MAX_REQUEST: usize = 16 * 1024;
/// How long stop() waits for in-flight block calls.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct Server {
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

pub struct HttpService {
    service: Arc<ExtensionService>,
    address: String,
    membership: Membership,
    server: Mutex<Option<Server>>,
}

impl HttpService {
    pub fn new(service: Arc<ExtensionService>, address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            service,
            address: address.into(),
            membership: Membership::new(),
            server: Mutex::new(None),
        })
    }

    pub fn service(&self) -> &Arc<ExtensionService> {
        &self.service
    }

    /// Bound port once started, else the requested one.
    pub fn port(&self) -> u16 {
        self.service.port()
    }
}

impl GroupMember for HttpService {
    fn name(&self) -> &str {
        self.service.name()
    }

    /// Bind now so errors surface here, then serve on a dedicated thread.
    fn start(&self) -> Result<(), ServiceError> {
        let mut server = self.server.lock();
        if server.is_some() {
            return Ok(());
        }
        let listener = std::net::TcpListener::bind((self.address.as_str(), self.service.port()))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        self.service.set_port(port);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name(format!("{} worker", self.name()))
            .enable_all()
            .build()?;
        let (tx, rx) = oneshot::channel();
        let service = Arc::clone(&self.service);
        let thread = std::thread::Builder::new()
            .name(format!("{} HTTP Server", self.name()))
            .spawn(move || {
                runtime.block_on(serve(listener, service, rx));
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
            })?;
        info!(extension = %self.name(), address = %self.address, port, "listening");
        *server = Some(Server {
            shutdown: tx,
            thread,
        });
        Ok(())
    }

    fn stop(&self) {
        let Some(server) = self.server.lock().take() else {
            return;
        };
        let _ = server.shutdown.send(());
        if server.thread.join().is_err() {
            warn!(extension = %self.name(), "server thread panicked");
        }
        info!(extension = %self.name(), "stopped");
    }

    fn running(&self) -> bool {
        self.server.lock().is_some()
    }

    fn membership(&self) -> &Membership {
        &self.membership
    }
}

impl Drop for HttpService {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: std::net::TcpListener,
    service: Arc<ExtensionService>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(l) => l,
        Err(e) => {
            error!(extension = %service.name(), error = %e, "cannot register listener");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, service).await {
                            debug!(%peer, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

#[derive(Debug)]
struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Response {
    fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::status(status)
        }
    }
}

/// Parse the request line. `Ok(None)` while the head is incomplete.
fn parse_request(buf: &[u8]) -> Result<Option<(String, String)>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf)? {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete(_) => Ok(req
            .method
            .zip(req.path)
            .map(|(m, p)| (m.to_string(), p.to_string()))),
    }
}

async fn handle_client(mut stream: TcpStream, service: Arc<ExtensionService>) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let (method, path) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        match parse_request(&buf) {
            Ok(Some(req)) => break req,
            Ok(None) if buf.len() < MAX_REQUEST => continue,
            _ => return write_response(&mut stream, Response::status(400), true).await,
        }
    };
    let response = respond(&service, &method, &path).await;
    debug!(extension = %service.name(), method = %method, path = %path, status = response.status, "request");
    write_response(&mut stream, response, method != "HEAD").await
}

async fn respond(service: &Arc<ExtensionService>, method: &str, path: &str) -> Response {
    if method != "GET" && method != "HEAD" {
        let mut r = Response::status(405);
        r.headers.push(("Allow".into(), "GET, HEAD".into()));
        return r;
    }
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let Some(cgi) = service.get_cgi(path) else {
        return Response::status(404);
    };
    let headers = cgi.headers().to_vec();
    if method == "HEAD" {
        return Response {
            headers,
            ..Response::status(200)
        };
    }
    // Blocks may wait on their condition variable; keep them off the reactor.
    match tokio::task::spawn_blocking(move || cgi.call()).await {
        Ok(Ok(body)) => Response {
            status: 200,
            headers,
            body,
        },
        Ok(Err(e)) if e.is_client_error() => Response::text(400, e.to_string()),
        Ok(Err(e)) => {
            warn!(extension = %service.name(), path, error = %e, "request failed");
            Response::status(500)
        }
        Err(e) => {
            error!(extension = %service.name(), path, error = %e, "handler panicked");
            Response::status(500)
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

async fn write_response(
    stream: &mut TcpStream,
    response: Response,
    with_body: bool,
) -> std::io::Result<()> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
    let has_type = response
        .headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
    if !has_type {
        head.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    }
    for (k, v) in &response.headers {
        head.push_str(&format!("{}: {}\r\n", k, v));
    }
    let length = if with_body { response.body.len() } else { 0 };
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", length));
    stream.write_all(head.as_bytes()).await?;
    if with_body {
        stream.write_all(response.body.as_bytes()).await?;
    }
    stream.flush().await?;
    stream.shutdown().await
}
