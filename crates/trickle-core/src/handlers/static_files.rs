//! Static file serving handler
//!
//! Serves files verbatim from a root directory. Paths are resolved relative to
//! the mount point; anything that would escape the root, or that names a dot
//! file, is a 404. No validators or caching headers are sent, so every
//! request reads the file again.

use crate::{Method, Request, Response, ResponseBuilder, StatusCode};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File served when a directory is requested
pub const INDEX_FILE: &str = "index.html";

/// Static file handler
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    /// Serve static files from directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle a request for `path`, relative to the mount point
    ///
    /// HEAD gets the same status and headers as GET; dropping the body is left
    /// to the caller.
    pub async fn handle(&self, req: &Request, path: &str) -> Response {
        if req.method != Method::Get && req.method != Method::Head {
            return ResponseBuilder::new(StatusCode::METHOD_NOT_ALLOWED)
                .header("Allow", "GET, HEAD")
                .body("Method not allowed")
                .build();
        }

        let Some(relative) = sanitize_path(path) else {
            debug!(path, "rejected static path");
            return Response::not_found();
        };
        let full_path = self.root.join(relative);

        match tokio::fs::metadata(&full_path).await {
            Ok(meta) if meta.is_dir() => {
                let index_path = full_path.join(INDEX_FILE);
                match tokio::fs::metadata(&index_path).await {
                    Ok(index_meta) if index_meta.is_file() => serve_file(&index_path).await,
                    _ => Response::not_found(),
                }
            }
            Ok(_) => serve_file(&full_path).await,
            Err(_) => Response::not_found(),
        }
    }
}

/// Relative path inside the root, or `None` for traversal and dot files
fn sanitize_path(path: &str) -> Option<PathBuf> {
    let path = path.trim_start_matches('/');

    if path.split('/').any(|s| s.starts_with('.') && s != ".") {
        return None;
    }

    let mut result = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => result.push(c),
            Component::CurDir => {}
            // ../, absolute roots and drive prefixes never map into the root
            _ => return None,
        }
    }

    Some(result)
}

async fn serve_file(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(content) => ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", mime_type(path))
            .body(content)
            .build(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "static file unreadable");
            Response::not_found()
        }
    }
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestBuilder;

    fn get() -> Request {
        RequestBuilder::new(Method::Get, "/static/x").build()
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/index.html"), Some(PathBuf::from("index.html")));
        assert_eq!(sanitize_path("css/style.css"), Some(PathBuf::from("css/style.css")));
        assert_eq!(sanitize_path("./a.html"), Some(PathBuf::from("a.html")));
        assert!(sanitize_path("/../etc/passwd").is_none());
        assert!(sanitize_path("a/../../b").is_none());
        assert!(sanitize_path("/.hidden").is_none());
        assert!(sanitize_path("preload/.git/config").is_none());
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_type(Path::new("app.JS")), "text/javascript; charset=utf-8");
        assert_eq!(mime_type(Path::new("pixel.svg")), "image/svg+xml");
        assert_eq!(mime_type(Path::new("unknown")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_serves_exact_bytes_without_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/page.html"), b"<p>static</p>").unwrap();

        let files = StaticFiles::new(dir.path());
        let res = files.handle(&get(), "nested/page.html").await;

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(res.body_string().as_deref(), Some("<p>static</p>"));
        assert!(res.header("etag").is_none());
        assert!(res.header("cache-control").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let files = StaticFiles::new(dir.path());

        let res = files.handle(&get(), "nope.html").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);

        let res = files.handle(&get(), "../secret").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dot_files_are_not_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), b"SECRET=1").unwrap();

        let res = StaticFiles::new(dir.path()).handle(&get(), ".env").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), b"index").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();

        let files = StaticFiles::new(dir.path());
        let res = files.handle(&get(), "docs").await;
        assert_eq!(res.body_string().as_deref(), Some("index"));

        let res = files.handle(&get(), "empty").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_matches_get_and_post_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let files = StaticFiles::new(dir.path());

        let head = RequestBuilder::new(Method::Head, "/static/a.txt").build();
        let res = files.handle(&head, "a.txt").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));

        let post = RequestBuilder::new(Method::Post, "/static/a.txt").build();
        let res = files.handle(&post, "a.txt").await;
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, HEAD"));
    }
}
