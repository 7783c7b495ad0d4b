//! Connection Session
//!
//! Drives one connection from registration to teardown:
//!
//! ```text
//! Connecting ──register──▶ Active ──close / protocol error──▶ Closed
//! ```
//!
//! Frames are processed strictly one at a time: request N+1 is not decoded
//! until request N has been handled and its responses queued.

use futures_util::{Stream, StreamExt};
use std::ops::ControlFlow;
use std::sync::Arc;

use super::connection::{ClientConnection, CLOSE_PROTOCOL_ERROR, CLOSE_TRY_AGAIN_LATER};
use super::hub::ConnectionHub;
use super::messages::{Request, Response};
use crate::injector::Dependencies;
use crate::routing::RouteTable;

/// A raw frame received from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the channel
    Close,
}

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

/// One connection's receive loop and the state it is bound to
pub struct Session {
    connection: Arc<ClientConnection>,
    hub: Arc<ConnectionHub>,
    routes: Arc<RouteTable>,
    deps: Dependencies,
    state: ConnectionState,
}

impl Session {
    pub fn new(
        connection: Arc<ClientConnection>,
        hub: Arc<ConnectionHub>,
        routes: Arc<RouteTable>,
        deps: Dependencies,
    ) -> Self {
        Self {
            connection,
            hub,
            routes,
            deps,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Register with the hub and process frames until the channel closes.
    ///
    /// The connection is deregistered before this returns.
    pub async fn run<S>(&mut self, frames: S)
    where
        S: Stream<Item = Frame> + Send,
    {
        if self.state != ConnectionState::Connecting {
            return;
        }

        if let Err(e) = self.hub.add(Arc::clone(&self.connection)).await {
            tracing::warn!(
                connection_id = %self.connection.id,
                key = %self.connection.key,
                error = %e,
                "Connection refused"
            );
            let notice = serde_json::json!({"error": e.to_string(), "code": e.code()});
            if let Err(e) = self.connection.send(notice.to_string()) {
                tracing::debug!(
                    connection_id = %self.connection.id,
                    error_code = e.code(),
                    "Failed to send refusal notice"
                );
            }
            self.connection.close(CLOSE_TRY_AGAIN_LATER, e.to_string());
            self.state = ConnectionState::Closed;
            return;
        }
        self.state = ConnectionState::Active;

        tokio::pin!(frames);
        while let Some(frame) = frames.next().await {
            let payload = match frame {
                Frame::Text(text) => text.into_bytes(),
                Frame::Binary(bytes) => bytes,
                Frame::Close => {
                    tracing::debug!(
                        connection_id = %self.connection.id,
                        "Client requested close"
                    );
                    break;
                }
            };

            if self.process(&payload).await.is_break() {
                break;
            }

            if self.connection.is_closed() {
                tracing::debug!(
                    connection_id = %self.connection.id,
                    "Writer stopped, closing connection"
                );
                break;
            }
        }

        self.close().await;
    }

    /// Handle one frame. `Break` means the connection must close.
    async fn process(&self, frame: &[u8]) -> ControlFlow<()> {
        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(err) => {
                let Some(partial) = &err.partial else {
                    tracing::warn!(
                        connection_id = %self.connection.id,
                        error = %err,
                        "Undecodable frame, closing connection"
                    );
                    self.connection.close(CLOSE_PROTOCOL_ERROR, err.to_string());
                    return ControlFlow::Break(());
                };

                tracing::debug!(
                    connection_id = %self.connection.id,
                    route = %partial.route,
                    event = %partial.event,
                    error = %err,
                    "Invalid client message"
                );
                let response = Response::error(partial, err.to_string());
                self.reply(&response).await;
                return ControlFlow::Continue(());
            }
        };

        let outbox = self.routes.dispatch(&request, &self.deps).await;
        for outgoing in &outbox {
            self.hub
                .deliver(&outgoing.response, &outgoing.delivery, &self.connection)
                .await;
        }

        ControlFlow::Continue(())
    }

    async fn reply(&self, response: &Response) {
        self.hub
            .deliver(response, &crate::routing::Delivery::Respondent, &self.connection)
            .await;
    }

    /// Deregister exactly once
    async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.hub.remove(&self.connection).await;
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::{Dep, Injector, Overlay};
    use crate::routing::{EventHandler, ResponseBuilder};
    use crate::websocket::{ConnectionKey, HubConfig, Outbound};
    use async_trait::async_trait;
    use futures_util::stream;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct Ping;

    #[async_trait]
    impl EventHandler for Ping {
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

    #[derive(Deserialize)]
    struct Shout {
        text: String,
    }

    struct Room {
        name: String,
    }

    struct ShoutEvent {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for ShoutEvent {
        const EVENT: &'static str = "shout";
        type Data = Shout;
        type Deps = Dep<Room>;

        async fn handle(
            &self,
            data: Shout,
            room: Dep<Room>,
            responses: &mut ResponseBuilder,
        ) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = responses.create_response(json!({
                "room": room.name,
                "text": data.text.to_uppercase(),
            }));
            responses.add_respondent_strategy(response);
            Ok(())
        }
    }

    struct Harness {
        hub: Arc<ConnectionHub>,
        routes: Arc<RouteTable>,
        injector: Injector,
        calls: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            let calls = Arc::new(AtomicUsize::new(0));
            let mut routes = RouteTable::new();
            routes
                .route("echo")
                .event(Ping)
                .unwrap()
                .event(ShoutEvent { calls: Arc::clone(&calls) })
                .unwrap();

            let mut injector = Injector::new();
            injector.provide(Room { name: "lobby".into() });

            Self {
                hub: Arc::new(ConnectionHub::default()),
                routes: Arc::new(routes),
                injector,
                calls,
            }
        }

        fn session(
            &self,
            key: &str,
            overlay: Overlay,
        ) -> (Session, mpsc::UnboundedReceiver<Outbound>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let connection = Arc::new(ClientConnection::new(key, tx));
            let session = Session::new(
                connection,
                Arc::clone(&self.hub),
                Arc::clone(&self.routes),
                self.injector.instantiate(overlay),
            );
            (session, rx)
        }
    }

    fn text(value: Value) -> Frame {
        Frame::Text(value.to_string())
    }

    fn responses(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(outbound) = rx.try_recv() {
            if let Outbound::Text(text) = outbound {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_lifecycle_registers_and_deregisters() {
        let harness = Harness::new();
        let (mut session, _rx) = harness.session("8001", Overlay::new());
        assert_eq!(session.state(), ConnectionState::Connecting);

        let hub = Arc::clone(&harness.hub);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Frame>();
        let frames = stream::unfold(frame_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        let task = tokio::spawn(async move {
            session.run(frames).await;
            session
        });

        frame_tx.send(text(json!({"route": "echo", "event": "ping"}))).unwrap();
        tokio::task::yield_now().await;
        while hub.connection_count().await == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.get(&ConnectionKey::from("8001")).await.len(), 1);

        frame_tx.send(Frame::Close).unwrap();
        let session = task.await.unwrap();
        assert_eq!(session.state(), ConnectionState::Closed);
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_ping_scenario() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![text(json!({"id": "x1", "route": "echo", "event": "ping"}))]))
            .await;

        assert_eq!(
            responses(&mut rx),
            vec![json!({
                "id": "x1",
                "event": "ping",
                "route": "echo",
                "data": {"data": "Pong"},
                "error": null
            })]
        );
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_id_above_i64_range_is_echoed() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![Frame::Text(
                r#"{"id": 18446744073709551615, "route": "echo", "event": "ping"}"#.into(),
            )]))
            .await;

        let out = responses(&mut rx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["id"], json!(u64::MAX));
        assert_eq!(out[0]["error"], Value::Null);
        assert_eq!(out[0]["data"]["data"], "Pong");
    }

    #[tokio::test]
    async fn test_unknown_route_keeps_connection_usable() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![
                text(json!({"id": 1, "route": "nope", "event": "ping"})),
                text(json!({"id": 2, "route": "echo", "event": "ping"})),
            ]))
            .await;

        let out = responses(&mut rx);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[0]["route"], "nope");
        assert!(out[0]["error"].is_string());
        assert_eq!(out[1]["id"], 2);
        assert_eq!(out[1]["error"], Value::Null);
        assert_eq!(out[1]["data"]["data"], "Pong");
    }

    #[tokio::test]
    async fn test_invalid_schema_never_invokes_handler() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![text(
                json!({"id": 5, "route": "echo", "event": "shout", "data": {"txt": "hi"}}),
            )]))
            .await;

        let out = responses(&mut rx);
        assert!(out[0]["error"].as_str().unwrap().contains("missing field `text`"));
        assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_dependency_beats_global() {
        let harness = Harness::new();
        let (mut session, mut rx) =
            harness.session("0", Overlay::new().bind(Room { name: "private".into() }));

        session
            .run(stream::iter(vec![Frame::Binary(
                json!({"route": "echo", "event": "shout", "data": {"text": "hi"}})
                    .to_string()
                    .into_bytes(),
            )]))
            .await;

        let out = responses(&mut rx);
        assert_eq!(out[0]["data"], json!({"room": "private", "text": "HI"}));
        assert_eq!(out[0]["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_data_is_recoverable() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![
                text(json!({"id": "a", "route": "echo", "event": "ping", "data": 42})),
                text(json!({"id": "b", "route": "echo", "event": "ping"})),
            ]))
            .await;

        let out = responses(&mut rx);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], "a");
        assert_eq!(out[0]["event"], "ping");
        assert!(out[0]["error"].as_str().unwrap().contains("object or a list"));
        assert_eq!(out[1]["error"], Value::Null);
    }

    #[tokio::test]
    async fn test_undecodable_frame_closes_connection() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![
                Frame::Text("{not json".into()),
                text(json!({"route": "echo", "event": "ping"})),
            ]))
            .await;

        match rx.try_recv() {
            Ok(Outbound::Close { code, .. }) => assert_eq!(code, CLOSE_PROTOCOL_ERROR),
            other => panic!("Expected Close, got {:?}", other),
        }
        // The second request is never processed
        assert!(rx.try_recv().is_err());
        assert_eq!(harness.hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_refused_when_hub_full() {
        let mut harness = Harness::new();
        harness.hub = Arc::new(ConnectionHub::new(HubConfig { max_connections: 0 }));
        let (mut session, mut rx) = harness.session("0", Overlay::new());

        session
            .run(stream::iter(vec![text(json!({"route": "echo", "event": "ping"}))]))
            .await;

        match rx.try_recv() {
            Ok(Outbound::Text(text)) => {
                let notice: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(notice["code"], "TOO_MANY_CONNECTIONS");
            }
            other => panic!("Expected error frame, got {:?}", other),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Close { code: CLOSE_TRY_AGAIN_LATER, .. })
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.state(), ConnectionState::Closed);
    }
}
