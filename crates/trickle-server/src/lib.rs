//! trickle-server: HTTP server for browser streaming experiments
//!
//! Serves HTML in timed chunks so a browser's first paint, first contentful
//! paint and preload scanner can be observed under an artificially slow
//! network, alongside plain pages and a static directory.

pub mod app;
pub mod config;
pub mod scenarios;

pub use app::{build_state, run, startup_urls};
pub use config::AppConfig;
