//! # Switchboard
//!
//! Routes JSON messages arriving over WebSockets to typed handlers, injects
//! per-connection dependencies into them, and delivers their responses to the
//! sender, to every connection of one identity, or to everyone.
//!
//! ## Modules
//!
//! - [`websocket`]: wire messages, connections, the connection hub and the
//!   per-connection receive loop
//! - [`routing`]: route table, handler trait and response builder
//! - [`injector`]: typed dependency registry
//! - [`server`]: axum router, health endpoints and graceful shutdown
//! - [`echo`]: the demonstration route
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use switchboard::{echo, server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state = echo::app_state(ServerConfig::default())?;
//!     server::serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod echo;
pub mod error;
pub mod injector;
pub mod routing;
pub mod server;
pub mod websocket;

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig};

pub use error::{DispatchError, DispatchResult};

pub use injector::{Dep, Dependencies, Injector, Overlay, Resolve};

pub use routing::{Delivery, EventHandler, Outgoing, ResponseBuilder, RouteGroup, RouteTable};

pub use server::{build_router, serve, AppState};

pub use websocket::{
    websocket_handler, ClientConnection, ConnectionHub, ConnectionKey, ConnectionSetup,
    Handshake, HubConfig, MessageId, Request, Response, Session,
};
