//! Route Table
//!
//! Maps `(route, event)` pairs to handlers. Populated once at startup, then
//! shared read-only (`Arc<RouteTable>`) by every connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::handler::{DynHandler, Erased, EventHandler};
use super::response::{Delivery, Outgoing, ResponseBuilder};
use crate::error::{DispatchError, DispatchResult};
use crate::injector::Dependencies;
use crate::websocket::{Request, Response};

/// Handlers slower than this are logged at warn level
const SLOW_HANDLER: Duration = Duration::from_secs(5);

/// Registry mapping routes and events to handlers
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, HashMap<String, Arc<dyn DynHandler>>>,
}

impl RouteTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `route` for its declared event name
    pub fn register<H: EventHandler>(&mut self, route: &str, handler: H) -> DispatchResult<()> {
        let events = self.routes.entry(route.to_string()).or_default();

        if events.contains_key(H::EVENT) {
            return Err(DispatchError::DuplicateRegistration {
                route: route.to_string(),
                event: H::EVENT.to_string(),
            });
        }

        let handler: Arc<dyn DynHandler> = Arc::new(Erased(handler));
        tracing::debug!(
            route,
            event = H::EVENT,
            schema = handler.schema(),
            "Registered event handler"
        );
        events.insert(H::EVENT.to_string(), handler);
        Ok(())
    }

    /// Handler group for one route key
    pub fn route(&mut self, key: impl Into<String>) -> RouteGroup<'_> {
        RouteGroup {
            table: self,
            key: key.into(),
        }
    }

    /// Resolve `(route, event)` to a handler
    pub fn lookup(&self, route: &str, event: &str) -> DispatchResult<Arc<dyn DynHandler>> {
        let events = self
            .routes
            .get(route)
            .ok_or_else(|| DispatchError::UnknownRoute(route.to_string()))?;

        events
            .get(event)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownEvent {
                route: route.to_string(),
                event: event.to_string(),
            })
    }

    /// All route keys (sorted)
    pub fn routes(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Event names registered under `route` (sorted)
    pub fn events(&self, route: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .routes
            .get(route)
            .map(|events| events.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// Total number of registered handlers
    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one request through lookup, validation, injection and the handler.
    ///
    /// Always answers: failures become a single error response to the
    /// requester. A handler that attaches nothing yields an empty outbox.
    pub async fn dispatch(&self, request: &Request, deps: &Dependencies) -> Vec<Outgoing> {
        let start = Instant::now();

        let result = match self.lookup(&request.route, &request.event) {
            Ok(handler) => {
                let mut responses = ResponseBuilder::new(request);
                handler
                    .call(request.data.clone(), deps, &mut responses)
                    .await
                    .map(|()| responses.into_outbox())
            }
            Err(e) => Err(e),
        };

        let elapsed = start.elapsed();
        if elapsed >= SLOW_HANDLER {
            tracing::warn!(
                route = %request.route,
                event = %request.event,
                duration_secs = elapsed.as_secs_f64(),
                "Slow event handler"
            );
        }

        match result {
            Ok(outbox) => {
                tracing::debug!(
                    route = %request.route,
                    event = %request.event,
                    responses = outbox.len(),
                    "Dispatched request"
                );
                outbox
            }
            Err(e) => {
                match &e {
                    DispatchError::Handler(_) | DispatchError::UnresolvedDependency(_) => {
                        tracing::error!(
                            route = %request.route,
                            event = %request.event,
                            error_code = e.code(),
                            error = %e,
                            "Event handler failed"
                        );
                    }
                    _ => {
                        tracing::debug!(
                            route = %request.route,
                            event = %request.event,
                            error_code = e.code(),
                            error = %e,
                            "Request rejected"
                        );
                    }
                }
                vec![Outgoing {
                    response: Response::error(request, e.to_string()),
                    delivery: Delivery::Respondent,
                }]
            }
        }
    }
}

/// Registers handlers under one route key
pub struct RouteGroup<'a> {
    table: &'a mut RouteTable,
    key: String,
}

impl RouteGroup<'_> {
    /// Register a handler for its declared event name
    pub fn event<H: EventHandler>(&mut self, handler: H) -> DispatchResult<&mut Self> {
        self.table.register(&self.key, handler)?;
        Ok(self)
    }
}
