//! Process-wide configuration
//!
//! Built once at startup and passed by reference; nothing reads settings
//! from files, flags or the environment. The asset root is found at startup,
//! never baked in at build time.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use trickle_core::{ServerConfig, StaticFiles};

/// Directories an asset root is expected to hold
const ASSET_DIRS: [&str; 2] = ["static", "stream"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listener settings (port 3000 on all interfaces)
    pub server: ServerConfig,
    /// Directory holding `static/` and `stream/`
    pub asset_root: PathBuf,
    /// URL prefix the static directory is served under
    pub static_mount: String,
    /// How long to wait for open streams after Ctrl-C
    pub drain_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            asset_root: resolve_asset_root(),
            static_mount: "/static".to_string(),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    pub fn with_asset_root(root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: root.into(),
            ..Self::default()
        }
    }

    pub fn static_root(&self) -> PathBuf {
        self.asset_root.join("static")
    }

    /// Template served by the referrer-test scenario
    pub fn referrer_template(&self) -> PathBuf {
        self.asset_root.join("stream").join("referrer-test.html")
    }

    /// Static handler for the static root
    pub fn static_files(&self) -> StaticFiles {
        StaticFiles::new(self.static_root())
    }
}

/// The working directory, or failing that the binary's directory, whichever
/// holds the asset directories
///
/// Falls back to the working directory (or `.`) with a warning, so a missing
/// tree shows up as 404s and a 500 on the template rather than a failed start.
pub fn resolve_asset_root() -> PathBuf {
    let cwd = std::env::current_dir().ok();
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let candidates: Vec<PathBuf> = cwd.iter().chain(exe_dir.iter()).cloned().collect();
    locate_asset_root(&candidates).unwrap_or_else(|| {
        let fallback = cwd.unwrap_or_else(|| PathBuf::from("."));
        warn!(
            root = %fallback.display(),
            "no static/ or stream/ directory found; serving from the working directory"
        );
        fallback
    })
}

/// First candidate that contains any of the asset directories
pub fn locate_asset_root(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|dir| ASSET_DIRS.iter().any(|name| dir.join(name).is_dir()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::with_asset_root(env!("CARGO_MANIFEST_DIR"));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.hostname, "0.0.0.0");
        assert_eq!(config.static_mount, "/static");
        assert!(config.referrer_template().ends_with("stream/referrer-test.html"));
        assert!(config.referrer_template().is_file());
        assert!(config.static_root().is_dir());
    }

    #[test]
    fn test_default_root_is_found_at_runtime() {
        let root = AppConfig::default().asset_root;
        let cwd = std::env::current_dir().unwrap();
        let exe_dir = std::env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert!(root == cwd || root == exe_dir, "{} came from neither", root.display());
    }

    #[test]
    fn test_locate_prefers_first_candidate_with_assets() {
        let empty = tempfile::tempdir().unwrap();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir(first.path().join("stream")).unwrap();
        std::fs::create_dir(second.path().join("static")).unwrap();

        let candidates = vec![
            empty.path().to_path_buf(),
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ];
        assert_eq!(locate_asset_root(&candidates), Some(first.path().to_path_buf()));
        assert_eq!(locate_asset_root(&candidates[..1]), None);
        assert_eq!(locate_asset_root(&[]), None);
    }

    #[test]
    fn test_with_asset_root() {
        let config = AppConfig::with_asset_root("/srv/trickle");
        assert_eq!(config.static_root(), PathBuf::from("/srv/trickle/static"));
        assert_eq!(config.referrer_template(), PathBuf::from("/srv/trickle/stream/referrer-test.html"));
    }
}
