//! trickle-core: HTTP server core for browser streaming experiments
//!
//! Provides the pieces the `trickle` binary wires together:
//! - request/response model with a streaming body
//! - [`stream`] - chunk sequences delivered with timed pauses
//! - [`handlers::static_files`] - static file serving
//! - [`diagnostics`] - startup URL discovery (assets, routes, local address)
//! - [`server`] - hyper accept loop on a tuned socket

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod diagnostics;
pub mod error;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod stream;

// Re-exports
pub use error::{Error, Result};
pub use request::{Method, Request, RequestBuilder};
pub use response::{Body, Response, ResponseBuilder, StatusCode};
pub use stream::{Chunk, ChunkSequence, ChunkedBody};
pub use trickle_router::{RouteInfo, Router};

pub use handlers::StaticFiles;

pub use server::{
    bind, create_optimized_socket, from_hyper_request, serve, to_hyper_response,
    ConnectionGuard, ConnectionTracker, DynamicHandler, ServerConfig, ServerState,
};
