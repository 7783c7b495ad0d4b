//! Application State
//!
//! Shared state accessible by all HTTP handlers and connection tasks.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::injector::Injector;
use crate::routing::RouteTable;
use crate::websocket::{ConnectionHub, Handshake};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Route table, frozen once the server starts
    pub routes: Arc<RouteTable>,
    /// Global dependency registry
    pub injector: Arc<Injector>,
    /// Live connections
    pub hub: Arc<ConnectionHub>,
    /// Names each new connection and binds its dependencies
    pub handshake: Arc<dyn Handshake>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        routes: RouteTable,
        injector: Injector,
        handshake: impl Handshake,
        config: ServerConfig,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            injector: Arc::new(injector),
            hub: Arc::new(ConnectionHub::new(config.hub_config())),
            handshake: Arc::new(handshake),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
