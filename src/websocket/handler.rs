//! WebSocket Handler
//!
//! Adapts axum's WebSocket upgrade to the transport-agnostic [`Session`].

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::connection::{ClientConnection, ConnectionKey, Outbound};
use super::session::{Frame, Session};
use crate::error::DispatchResult;
use crate::injector::{Dependencies, Overlay};
use crate::server::AppState;

/// How long the writer may keep flushing after the receive loop ends
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// What the application decided about a new connection
pub struct ConnectionSetup {
    /// Identity key to register the connection under
    pub key: ConnectionKey,
    /// Per-connection dependency values
    pub overlay: Overlay,
}

impl ConnectionSetup {
    pub fn new(key: impl Into<ConnectionKey>) -> Self {
        Self {
            key: key.into(),
            overlay: Overlay::new(),
        }
    }

    /// Bind a per-connection dependency value
    pub fn bind<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.overlay = self.overlay.bind(value);
        self
    }
}

/// Turns the upgrade request's query parameters into a connection identity.
///
/// Returning an error rejects the upgrade with `400 Bad Request`.
pub trait Handshake: Send + Sync + 'static {
    fn accept(&self, params: &HashMap<String, String>) -> DispatchResult<ConnectionSetup>;
}

impl<F> Handshake for F
where
    F: Fn(&HashMap<String, String>) -> DispatchResult<ConnectionSetup> + Send + Sync + 'static,
{
    fn accept(&self, params: &HashMap<String, String>) -> DispatchResult<ConnectionSetup> {
        self(params)
    }
}

/// WebSocket upgrade handler
///
/// Runs the application handshake, then upgrades the HTTP connection and
/// hands the socket to a [`Session`].
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let setup = match state.handshake.accept(&params) {
        Ok(setup) => setup,
        Err(e) => {
            tracing::warn!(error_code = e.code(), error = %e, "WebSocket handshake rejected");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let deps = state.injector.instantiate(setup.overlay);
    let key = setup.key;
    ws.on_upgrade(move |socket| handle_socket(socket, key, deps, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    key: ConnectionKey,
    deps: Dependencies,
    state: Arc<AppState>,
) {
    let (mut sender, receiver) = socket.split();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let connection = Arc::new(ClientConnection::new(key, tx));
    let connection_id = connection.id.clone();

    // Task to forward queued frames to the socket
    let writer_id = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let closing = matches!(outbound, Outbound::Close { .. });
            if let Err(e) = sender.send(to_message(outbound)).await {
                tracing::debug!(
                    connection_id = %writer_id,
                    error = %e,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_id = connection_id.clone();
    let frames = receiver.filter_map(move |result| {
        let reader_id = reader_id.clone();
        async move {
            match result {
                Ok(message) => to_frame(message),
                Err(e) => {
                    tracing::debug!(
                        connection_id = %reader_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    Some(Frame::Close)
                }
            }
        }
    });

    let mut session = Session::new(
        connection,
        Arc::clone(&state.hub),
        Arc::clone(&state.routes),
        deps,
    );
    session.run(frames).await;

    // Dropping the session releases this task's sender; the writer drains
    // whatever is queued and stops
    drop(session);
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        tracing::debug!(connection_id = %connection_id, "Writer did not finish, aborting");
        writer.abort();
    }
}

/// Map a socket message to a session frame. Control frames are dropped.
fn to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text)),
        Message::Binary(bytes) => Some(Frame::Binary(bytes)),
        Message::Close(_) => Some(Frame::Close),
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

fn to_message(outbound: Outbound) -> Message {
    match outbound {
        Outbound::Text(text) => Message::Text(text),
        Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}
