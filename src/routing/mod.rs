//! Event Routing
//!
//! Connects decoded requests with the handlers that process them.
//!
//! ## Architecture
//!
//! - **RouteTable**: `route → event → handler`, built once at startup
//! - **EventHandler**: typed business logic with a payload schema and
//!   injected dependencies
//! - **ResponseBuilder**: collects responses and their delivery strategy
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut routes = RouteTable::new();
//! routes.route("echo").event(PingEvent)?.event(UserEvent)?;
//!
//! let outbox = routes.dispatch(&request, &deps).await;
//! ```

mod handler;
mod response;
mod router;

pub use handler::{DynHandler, EventHandler};
pub use response::{Delivery, Outgoing, ResponseBuilder};
pub use router::{RouteGroup, RouteTable};
