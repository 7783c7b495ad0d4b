//! Echo Route
//!
//! The demonstration route served by the binary. Connections identify
//! themselves with `?user_id=N` (default 0) and get a [`User`] bound for the
//! lifetime of the socket.
//!
//! | event      | data                         | delivery              |
//! |------------|------------------------------|-----------------------|
//! | `ping`     | anything                     | respondent            |
//! | `user`     | `{user_id}`                  | respondent            |
//! | `notify`   | `{target, message}`          | target key, then ack  |
//! | `announce` | `{message}`                  | every connection      |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::config::ServerConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::injector::{Dep, Injector};
use crate::routing::{EventHandler, ResponseBuilder, RouteTable};
use crate::server::AppState;
use crate::websocket::ConnectionSetup;

/// Route key for every event in this module
pub const ROUTE: &str = "echo";

/// The user that owns a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UserSchema {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct NotifySchema {
    /// User id to deliver to, on all of their connections
    pub target: i64,
    pub message: Value,
}

#[derive(Debug, Deserialize)]
pub struct AnnounceSchema {
    pub message: Value,
}

/// Answers with `{"data": "Pong"}`
pub struct PingEvent;

#[async_trait]
impl EventHandler for PingEvent {
    const EVENT: &'static str = "ping";
    type Data = Value;
    type Deps = ();

    async fn handle(
        &self,
        _data: Value,
        _deps: (),
        responses: &mut ResponseBuilder,
    ) -> anyhow::Result<()> {
        responses.reply(json!({"data": "Pong"}));
        Ok(())
    }
}

/// Reports the connection's user next to the id sent in the payload
pub struct UserEvent;

#[async_trait]
impl EventHandler for UserEvent {
    const EVENT: &'static str = "user";
    type Data = UserSchema;
    type Deps = Dep<User>;

    async fn handle(
        &self,
        data: UserSchema,
        user: Dep<User>,
        responses: &mut ResponseBuilder,
    ) -> anyhow::Result<()> {
        responses.reply(json!({
            "user": user.id,
            "user_id_from_request": data.user_id,
        }));
        Ok(())
    }
}

/// Direct message to every connection of one user
pub struct NotifyEvent;

#[async_trait]
impl EventHandler for NotifyEvent {
    const EVENT: &'static str = "notify";
    type Data = NotifySchema;
    type Deps = Dep<User>;

    async fn handle(
        &self,
        data: NotifySchema,
        user: Dep<User>,
        responses: &mut ResponseBuilder,
    ) -> anyhow::Result<()> {
        let message = responses.create_response(json!({
            "from": user.id,
            "message": data.message,
        }));
        responses.add_key_strategy(message, data.target);
        responses.reply(json!({"delivered_to": data.target}));
        Ok(())
    }
}

/// Message to every live connection, the sender included
pub struct AnnounceEvent;

#[async_trait]
impl EventHandler for AnnounceEvent {
    const EVENT: &'static str = "announce";
    type Data = AnnounceSchema;
    type Deps = Dep<User>;

    async fn handle(
        &self,
        data: AnnounceSchema,
        user: Dep<User>,
        responses: &mut ResponseBuilder,
    ) -> anyhow::Result<()> {
        let announcement = responses.create_response(json!({
            "from": user.id,
            "message": data.message,
        }));
        responses.add_broadcast_strategy(announcement);
        Ok(())
    }
}

/// Register the echo route and declare the [`User`] capability
pub fn register(routes: &mut RouteTable, injector: &mut Injector) -> DispatchResult<()> {
    routes
        .route(ROUTE)
        .event(PingEvent)?
        .event(UserEvent)?
        .event(NotifyEvent)?
        .event(AnnounceEvent)?;

    injector.register::<User>();
    Ok(())
}

/// Identify a connection by its `user_id` query parameter
pub fn handshake(params: &HashMap<String, String>) -> DispatchResult<ConnectionSetup> {
    let id = match params.get("user_id") {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| DispatchError::Handshake(format!("Invalid user_id: {}", raw)))?,
        None => 0,
    };

    Ok(ConnectionSetup::new(id).bind(User { id }))
}

/// Application state serving the echo route
pub fn app_state(config: ServerConfig) -> DispatchResult<AppState> {
    let mut routes = RouteTable::new();
    let mut injector = Injector::new();
    register(&mut routes, &mut injector)?;

    Ok(AppState::new(routes, injector, handshake, config))
}
