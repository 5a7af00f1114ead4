//! trickle-router: zero-dependency trie router with a route registry
//!
//! Every route is recorded twice: in a per-method segment trie used for
//! dispatch, and in an ordered registry of `(method, path)` entries
//! that can be listed for diagnostics without reaching into the trie.
//!
//! Paths are matched segment by segment; empty segments are ignored, so
//! `/a/` and `/a` are the same route.
//!
//! ## Example
//! ```
//! use trickle_router::Router;
//!
//! let mut router = Router::new();
//! router.insert("GET", "/", 0);
//! router.insert("GET", "/stream/slow-stream", 1);
//!
//! assert_eq!(router.find("GET", "/stream/slow-stream"), Some(1));
//! assert_eq!(router.find("GET", "/stream"), None);
//!
//! let listed: Vec<_> = router.routes().into_iter().map(|r| r.path).collect();
//! assert_eq!(listed, vec!["/", "/stream/slow-stream"]);
//! ```

use std::collections::HashMap;

/// One registered route, in registration order
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteEntry {
    method: String,
    path: String,
}

/// A path together with every method registered on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub path: String,
    pub methods: Vec<String>,
}

impl RouteInfo {
    /// Methods joined the way startup logs print them, e.g. `GET, POST`
    pub fn methods_label(&self) -> String {
        self.methods.join(", ")
    }
}

#[derive(Debug, Default)]
struct Node {
    /// Children keyed by path segment
    children: HashMap<String, Node>,
    /// Handler ID if this is a terminal node
    handler_id: Option<u32>,
}

/// Trie router plus ordered route registry
#[derive(Debug, Default)]
pub struct Router {
    /// Method -> Trie root
    trees: HashMap<String, Node>,
    /// Every insert, oldest first
    entries: Vec<RouteEntry>,
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route
    ///
    /// Methods are case-insensitive and stored upper-case. Re-registering the
    /// same method and path replaces the handler in the trie; the registry
    /// keeps both entries so the listing reflects what was registered.
    pub fn insert(&mut self, method: &str, path: &str, handler_id: u32) {
        let method = method.to_uppercase();
        let node = segments(path).fold(self.trees.entry(method.clone()).or_default(), |node, segment| {
            node.children.entry(segment.to_string()).or_default()
        });
        node.handler_id = Some(handler_id);

        self.entries.push(RouteEntry {
            method,
            path: path.to_string(),
        });
    }

    /// Handler ID registered for `method` and `path`
    pub fn find(&self, method: &str, path: &str) -> Option<u32> {
        let mut node = self.trees.get(&method.to_uppercase())?;
        for segment in segments(path) {
            node = node.children.get(segment)?;
        }
        node.handler_id
    }

    /// Registered routes grouped by path
    ///
    /// Paths appear in the order they were first registered; each path lists
    /// its methods in registration order without duplicates.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = Vec::new();
        for entry in &self.entries {
            match routes.iter_mut().find(|r| r.path == entry.path) {
                Some(route) => {
                    if !route.methods.contains(&entry.method) {
                        route.methods.push(entry.method.clone());
                    }
                }
                None => routes.push(RouteInfo {
                    path: entry.path.clone(),
                    methods: vec![entry.method.clone()],
                }),
            }
        }
        routes
    }

    /// Number of registrations, duplicates included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
