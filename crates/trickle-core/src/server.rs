//! Native HTTP server
//!
//! hyper HTTP/1.1 on a multi-threaded tokio runtime:
//! - one task per connection
//! - handler IDs from the route registry map to async handlers
//! - static directories mounted under a path prefix
//! - SO_REUSEPORT / TCP_NODELAY listener socket
//! - on shutdown, open connections finish their response and close

use crate::handlers::StaticFiles;
use crate::response::Body;
use crate::{Error, Method, Request, Response, Result};
use hyper::body::Incoming;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use trickle_router::{RouteInfo, Router};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "0.0.0.0".to_string(),
            workers: num_cpus::get(),
        }
    }
}

impl ServerConfig {
    /// Socket address to listen on
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.hostname, self.port)
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{}:{}: {}", self.hostname, self.port, e)))
    }
}

/// Dynamic route handler type
pub type DynamicHandler =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// Server state shared across all connections
///
/// Routes and mounts are registered before serving; requests only read.
pub struct ServerState {
    /// Route registry and trie, keyed by handler ID
    router: RwLock<Router>,
    /// Handlers indexed by handler ID
    handlers: RwLock<HashMap<u32, DynamicHandler>>,
    /// Static directories by mount prefix, in registration order
    mounts: RwLock<Vec<(String, StaticFiles)>>,
    next_handler_id: AtomicU32,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            router: RwLock::new(Router::new()),
            handlers: RwLock::new(HashMap::new()),
            mounts: RwLock::new(Vec::new()),
            next_handler_id: AtomicU32::new(0),
        }
    }

    /// Register a handler for `method` and `path`, returning its handler ID
    pub fn route<F, Fut>(&self, method: Method, path: &str, handler: F) -> u32
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler_id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let handler: DynamicHandler = Arc::new(
            move |req| -> Pin<Box<dyn Future<Output = Response> + Send>> { Box::pin(handler(req)) },
        );

        self.router.write().insert(method.as_str(), path, handler_id);
        self.handlers.write().insert(handler_id, handler);
        debug!(%method, path, handler_id, "route registered");
        handler_id
    }

    /// Register a GET handler; it also answers HEAD
    pub fn get<F, Fut>(&self, path: &str, handler: F) -> u32
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Get, path, handler)
    }

    /// Serve `files` for every path under `prefix`
    pub fn mount(&self, prefix: &str, files: StaticFiles) -> Result<()> {
        if !prefix.starts_with('/') {
            return Err(Error::InvalidPath(prefix.to_string()));
        }
        let prefix = prefix.trim_end_matches('/').to_string();
        debug!(prefix = %prefix, root = %files.root().display(), "static mount registered");
        self.mounts.write().push((prefix, files));
        Ok(())
    }

    /// Registered routes grouped by path, in registration order
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.router.read().routes()
    }

    /// Match and handle a request
    ///
    /// A HEAD request without a HEAD route is answered by the GET route for
    /// the same path. HEAD responses keep their status and headers but never
    /// carry a body.
    pub async fn handle(&self, req: Request) -> Response {
        if req.method != Method::Head {
            return self.dispatch(req).await;
        }
        let mut response = self.dispatch(req).await;
        strip_body(&mut response);
        response
    }

    async fn dispatch(&self, req: Request) -> Response {
        let handler = self.find_handler(req.method, &req.path);
        if let Some(handler) = handler {
            return handler(req).await;
        }

        let mount = self.mounts.read().iter().find_map(|(prefix, files)| {
            mount_relative(prefix, &req.path).map(|rest| (rest.to_string(), files.clone()))
        });
        if let Some((rest, files)) = mount {
            return files.handle(&req, &rest).await;
        }

        Response::not_found()
    }

    fn find_handler(&self, method: Method, path: &str) -> Option<DynamicHandler> {
        let router = self.router.read();
        let handler_id = router.find(method.as_str(), path).or_else(|| match method {
            Method::Head => router.find(Method::Get.as_str(), path),
            _ => None,
        })?;
        self.handlers.read().get(&handler_id).cloned()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the body of a HEAD response, keeping the length a GET would report
fn strip_body(response: &mut Response) {
    let body = std::mem::take(&mut response.body);
    if let Body::Full(data) = &body {
        if response.header("content-length").is_none() {
            response.headers.push(("Content-Length".to_string(), data.len().to_string()));
        }
    }
}

/// Remainder of `path` below `prefix`, if `path` is inside the mount
fn mount_relative<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest.trim_start_matches('/'))
    } else {
        None
    }
}

/// Create a TCP socket with optimizations
pub fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // TCP_NODELAY - chunks should leave as soon as they are written
    socket.set_nodelay(true)?;

    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

/// Bind the configured address and hand the socket to tokio
pub fn bind(config: &ServerConfig) -> Result<TcpListener> {
    let addr = config.addr()?;
    let socket = create_optimized_socket(&addr)?;
    socket.set_nonblocking(true)?;
    Ok(TcpListener::from_std(socket.into())?)
}

/// Convert hyper request to our Request type
pub fn from_hyper_request<B>(req: &hyper::Request<B>) -> Result<Request> {
    let method = Method::parse(req.method().as_str())?;
    let mut request = Request::new(method, req.uri().path());

    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    Ok(request)
}

/// Convert our Response to hyper Response
///
/// Headers that are not valid HTTP are dropped with a warning rather than
/// failing the whole response.
pub fn to_hyper_response(res: Response) -> hyper::Response<Body> {
    let mut response = hyper::Response::new(res.body);

    *response.status_mut() = http::StatusCode::from_u16(res.status.as_u16()).unwrap_or_else(|_| {
        warn!(status = res.status.as_u16(), "invalid status code");
        http::StatusCode::INTERNAL_SERVER_ERROR
    });

    let headers = response.headers_mut();
    for (name, value) in &res.headers {
        match (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }

    response
}

async fn handle_request(
    state: Arc<ServerState>,
    req: hyper::Request<Incoming>,
) -> std::result::Result<hyper::Response<Body>, Infallible> {
    let started = Instant::now();

    let response = match from_hyper_request(&req) {
        Ok(request) => state.handle(request).await,
        Err(e) => Response::bad_request(&e.to_string()),
    };

    debug!(
        method = %req.method(),
        path = req.uri().path(),
        referer = ?req.headers().get(http::header::REFERER).and_then(|v| v.to_str().ok()),
        status = response.status.as_u16(),
        streaming = response.body.is_streaming(),
        elapsed = ?started.elapsed(),
        "request handled"
    );

    Ok(to_hyper_response(response))
}

/// Accept connections until `shutdown` resolves
///
/// Each connection is served on its own task. Once `shutdown` resolves the
/// accept loop stops and every open connection is asked to close after its
/// current response; use [`ConnectionTracker::wait_for_drain`] to wait for
/// them.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    tracker: Arc<ConnectionTracker>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;

    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = &mut shutdown => {
                tracker.start_shutdown();
                info!(active = tracker.active(), "no longer accepting connections");
                return Ok(());
            }
        };

        let state = state.clone();
        let guard = tracker.track();
        let stopping = tracker.stopping();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| handle_request(state.clone(), req));
            let conn = http1::Builder::new().serve_connection(io, service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = stopping => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };
            if let Err(e) = result {
                // clients leaving mid-stream land here
                debug!(%peer, error = %e, "connection ended with error");
            }

            drop(guard);
        });
    }
}

/// Counts open connections and broadcasts the shutdown request to them
#[derive(Debug)]
pub struct ConnectionTracker {
    active: AtomicUsize,
    /// Woken whenever the last open connection closes
    drained: Notify,
    shutdown: watch::Sender<bool>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            active: AtomicUsize::new(0),
            drained: Notify::new(),
            shutdown,
        }
    }

    /// Count a connection as open until the returned guard is dropped
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            tracker: self.clone(),
        }
    }

    /// Number of open connections
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Ask every open connection to close after its current response
    pub fn start_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has started, including if it already has
    pub fn stopping(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Wait until no connections remain or `timeout` passes
    ///
    /// Returns true if all connections drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let drained = self.drained.notified();
            if self.active() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                return self.active() == 0;
            }
        }
    }
}

/// An open connection; dropping it closes the connection's slot
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkSequence, RequestBuilder, ResponseBuilder, StatusCode};

    fn state() -> ServerState {
        let state = ServerState::new();
        state.get("/", |_req| async { Response::html("home") });
        state.get("/stream/slow-stream", |_req| async {
            ResponseBuilder::new(StatusCode::OK)
                .header("Content-Type", "text/html")
                .body(
                    ChunkSequence::new()
                        .write_then_wait("a", Duration::from_secs(2))
                        .into_body("slow-stream"),
                )
                .build()
        });
        state
    }

    async fn request(state: &ServerState, method: Method, path: &str) -> Response {
        state.handle(RequestBuilder::new(method, path).build()).await
    }

    #[tokio::test]
    async fn test_dispatch() {
        let state = state();

        let res = request(&state, Method::Get, "/").await;
        assert_eq!(res.body_string().as_deref(), Some("home"));

        let res = request(&state, Method::Get, "/stream/slow-stream").await;
        assert!(res.body.is_streaming());

        let res = request(&state, Method::Post, "/").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);

        let res = request(&state, Method::Get, "/stream").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_uses_get_route_without_body() {
        let state = state();

        let res = request(&state, Method::Head, "/").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(res.header("content-length"), Some("4"));
        assert!(matches!(res.body, Body::Empty));

        let res = request(&state, Method::Head, "/stream/slow-stream").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/html"));
        assert!(!res.body.is_streaming());

        let res = request(&state, Method::Head, "/missing").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert!(matches!(res.body, Body::Empty));
    }

    #[tokio::test]
    async fn test_explicit_head_route_wins() {
        let state = state();
        state.route(Method::Head, "/", |_req| async {
            ResponseBuilder::new(StatusCode::OK).header("X-Head", "1").build()
        });

        let res = request(&state, Method::Head, "/").await;
        assert_eq!(res.header("x-head"), Some("1"));
    }

    #[tokio::test]
    async fn test_static_mount() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();

        let state = state();
        state.mount("/static/", StaticFiles::new(dir.path())).unwrap();

        let res = request(&state, Method::Get, "/static/page.html").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("<p>hi</p>"));

        let res = request(&state, Method::Head, "/static/page.html").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("content-length"), Some("9"));
        assert!(matches!(res.body, Body::Empty));

        let res = request(&state, Method::Get, "/staticpage.html").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);

        assert!(state.mount("static", StaticFiles::new(dir.path())).is_err());
    }

    #[test]
    fn test_routes_listing() {
        let state = state();
        let paths: Vec<String> = state.routes().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/", "/stream/slow-stream"]);
    }

    #[test]
    fn test_mount_relative() {
        assert_eq!(mount_relative("/static", "/static/a/b.html"), Some("a/b.html"));
        assert_eq!(mount_relative("/static", "/static"), Some(""));
        assert_eq!(mount_relative("/static", "/statics/a"), None);
        assert_eq!(mount_relative("/static", "/other"), None);
    }

    #[test]
    fn test_to_hyper_response() {
        let res = ResponseBuilder::new(StatusCode::OK)
            .header("Referrer-Policy", "no-referrer-when-downgrade")
            .header("bad header", "x")
            .body("ok")
            .build();

        let hyper_res = to_hyper_response(res);
        assert_eq!(hyper_res.status(), http::StatusCode::OK);
        assert_eq!(
            hyper_res.headers().get("referrer-policy").unwrap(),
            "no-referrer-when-downgrade"
        );
        assert_eq!(hyper_res.headers().len(), 1);
    }

    #[test]
    fn test_from_hyper_request() {
        let req = hyper::Request::builder()
            .method("GET")
            .uri("/stream/slow-stream?debug=1")
            .header("accept", "text/html")
            .body(())
            .unwrap();

        let request = from_hyper_request(&req).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/stream/slow-stream");
        assert_eq!(request.header("Accept"), Some("text/html"));

        let brew = hyper::Request::builder().method("BREW").uri("/").body(()).unwrap();
        assert!(matches!(from_hyper_request(&brew), Err(Error::InvalidMethod(_))));
    }

    #[test]
    fn test_config_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.addr().unwrap(), "0.0.0.0:3000".parse().unwrap());

        let bad = ServerConfig {
            hostname: "not an ip".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(bad.addr(), Err(Error::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_tracker_counts_guards() {
        let tracker = Arc::new(ConnectionTracker::new());
        assert!(tracker.wait_for_drain(Duration::from_millis(5)).await);

        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.active(), 2);
        assert!(!tracker.wait_for_drain(Duration::from_millis(20)).await);

        drop(first);
        drop(second);
        assert_eq!(tracker.active(), 0);
        assert!(tracker.wait_for_drain(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_drain_wakes_when_last_connection_closes() {
        let tracker = Arc::new(ConnectionTracker::new());
        let guard = tracker.track();

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        let started = Instant::now();
        assert!(tracker.wait_for_drain(Duration::from_secs(5)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopping_resolves_before_and_after_shutdown() {
        let tracker = ConnectionTracker::new();
        let early = tracker.stopping();
        assert!(!tracker.is_shutting_down());

        tracker.start_shutdown();
        assert!(tracker.is_shutting_down());
        early.await;
        tracker.stopping().await;
    }
}
