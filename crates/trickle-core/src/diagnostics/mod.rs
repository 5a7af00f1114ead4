//! Startup diagnostics
//!
//! Everything here runs once, after the listener is bound, to tell a human
//! which URLs to open. Failures degrade the output; they never stop startup.

pub mod assets;
pub mod netif;

pub use assets::{list_files, list_html};
pub use netif::{first_external_ipv4, interfaces, local_ipv4, Interface};

use std::net::Ipv4Addr;
use std::path::Path;
use trickle_router::RouteInfo;

/// Host printed when no LAN address could be resolved
pub const PLACEHOLDER_HOST: &str = "localhost";

/// `http://<host>:<port>` for the resolved address, or the placeholder host
pub fn base_url(host: Option<Ipv4Addr>, port: u16) -> String {
    match host {
        Some(ip) => format!("http://{}:{}", ip, port),
        None => format!("http://{}:{}", PLACEHOLDER_HOST, port),
    }
}

/// URL of a file under a static mount, with `/` separators on every platform
pub fn static_url(base: &str, mount: &str, relative: &Path) -> String {
    let mut url = format!("{}{}", base, mount.trim_end_matches('/'));
    for component in relative.components() {
        url.push('/');
        url.push_str(&component.as_os_str().to_string_lossy());
    }
    url
}

/// Every URL worth printing: registered routes first, then static files
pub fn reachable_urls<P>(
    base: &str,
    routes: &[RouteInfo],
    mount: &str,
    files: impl IntoIterator<Item = P>,
) -> Vec<String>
where
    P: AsRef<Path>,
{
    routes
        .iter()
        .map(|route| format!("{}{}", base, route.path))
        .chain(files.into_iter().map(|file| static_url(base, mount, file.as_ref())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url(Some(Ipv4Addr::new(192, 168, 0, 7)), 3000), "http://192.168.0.7:3000");
        assert_eq!(base_url(None, 3000), "http://localhost:3000");
    }

    #[test]
    fn test_reachable_urls() {
        let routes = vec![
            RouteInfo {
                path: "/".to_string(),
                methods: vec!["GET".to_string()],
            },
            RouteInfo {
                path: "/stream/slow-stream".to_string(),
                methods: vec!["GET".to_string()],
            },
        ];
        let files = vec![PathBuf::from("index.html"), PathBuf::from("perf/fcp.html")];

        let urls = reachable_urls("http://10.0.0.2:3000", &routes, "/static/", files);
        assert_eq!(
            urls,
            vec![
                "http://10.0.0.2:3000/",
                "http://10.0.0.2:3000/stream/slow-stream",
                "http://10.0.0.2:3000/static/index.html",
                "http://10.0.0.2:3000/static/perf/fcp.html",
            ]
        );
    }

    #[test]
    fn test_no_files() {
        let urls = reachable_urls("http://localhost:3000", &[], "/static", Vec::<PathBuf>::new());
        assert!(urls.is_empty());
    }
}
