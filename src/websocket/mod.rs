//! WebSocket Connections
//!
//! Everything between a raw socket and the route table.
//!
//! ## Architecture
//!
//! - **Messages**: request and response wire shapes
//! - **ClientConnection**: identity of one socket plus its outbound queue
//! - **ConnectionHub**: live connections keyed by identity, with fan-out
//! - **Session**: the per-connection receive loop
//! - **Handler**: axum upgrade and the [`Handshake`] that names a connection
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8000/ws?user_id=8001');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({id: 1, route: 'echo', event: 'user', data: {user_id: 113}}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   console.log('Received:', msg);
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
mod session;

pub use connection::{
    ClientConnection, ConnectionId, ConnectionKey, Outbound, CLOSE_PROTOCOL_ERROR,
    CLOSE_TRY_AGAIN_LATER,
};
pub use handler::{websocket_handler, ConnectionSetup, Handshake};
pub use hub::{ConnectionHub, HubConfig};
pub use messages::{DecodeError, MessageId, Request, Response};
pub use session::{ConnectionState, Frame, Session};
