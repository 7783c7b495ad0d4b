//! Response Builder
//!
//! Collects the responses a handler wants to send and who should receive
//! each one.

use serde_json::Value;

use crate::websocket::{ConnectionKey, Request, Response};

/// Who receives a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Only the connection that sent the request
    Respondent,
    /// Every connection registered under the key
    ByKey(ConnectionKey),
    /// Every registered connection
    Broadcast,
}

/// A response paired with its delivery strategy
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub response: Response,
    pub delivery: Delivery,
}

/// Builds responses for one request.
///
/// Strategies are delivered in the order they were attached. A handler that
/// attaches nothing sends nothing.
#[derive(Debug)]
pub struct ResponseBuilder {
    request: Request,
    outbox: Vec<Outgoing>,
}

impl ResponseBuilder {
    /// Create a builder echoing the request's `id`, `event` and `route`
    pub fn new(request: &Request) -> Self {
        Self {
            request: Request {
                id: request.id.clone(),
                event: request.event.clone(),
                route: request.route.clone(),
                data: None,
            },
            outbox: Vec::new(),
        }
    }

    /// Build a successful response carrying `data`
    pub fn create_response(&self, data: Value) -> Response {
        Response::success(&self.request, data)
    }

    /// Build an error response
    pub fn create_error_response(&self, error: impl Into<String>) -> Response {
        Response::error(&self.request, error)
    }

    /// Attach a response with an explicit strategy
    pub fn add_strategy(&mut self, response: Response, delivery: Delivery) -> &mut Self {
        self.outbox.push(Outgoing { response, delivery });
        self
    }

    /// Send the response back to the requesting connection
    pub fn add_respondent_strategy(&mut self, response: Response) -> &mut Self {
        self.add_strategy(response, Delivery::Respondent)
    }

    /// Send the response to every connection registered under `key`
    pub fn add_key_strategy(
        &mut self,
        response: Response,
        key: impl Into<ConnectionKey>,
    ) -> &mut Self {
        self.add_strategy(response, Delivery::ByKey(key.into()))
    }

    /// Send the response to every registered connection
    pub fn add_broadcast_strategy(&mut self, response: Response) -> &mut Self {
        self.add_strategy(response, Delivery::Broadcast)
    }

    /// Shorthand for replying to the requester with `data`
    pub fn reply(&mut self, data: Value) -> &mut Self {
        let response = self.create_response(data);
        self.add_respondent_strategy(response)
    }

    /// Number of attached responses
    pub fn len(&self) -> usize {
        self.outbox.len()
    }

    /// Whether nothing has been attached
    pub fn is_empty(&self) -> bool {
        self.outbox.is_empty()
    }

    /// Consume the builder, yielding responses in attachment order
    pub fn into_outbox(self) -> Vec<Outgoing> {
        self.outbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::MessageId;
    use serde_json::json;

    #[test]
    fn test_response_echoes_request() {
        let request = Request::new("echo", "ping")
            .id("05.08.2024")
            .data(json!({"ignored": true}));
        let builder = ResponseBuilder::new(&request);

        let response = builder.create_response(json!({"data": "Pong"}));
        assert_eq!(response.id, Some(MessageId::Str("05.08.2024".into())));
        assert_eq!(response.route, "echo");
        assert_eq!(response.event, "ping");
        assert_eq!(response.data, json!({"data": "Pong"}));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response() {
        let builder = ResponseBuilder::new(&Request::new("echo", "ping").id(5_i64));
        let response = builder.create_error_response("nope");
        assert_eq!(response.error.as_deref(), Some("nope"));
        assert_eq!(response.data, json!({}));
    }

    #[test]
    fn test_strategies_keep_attachment_order() {
        let mut builder = ResponseBuilder::new(&Request::new("chat", "send"));
        let ack = builder.create_response(json!({"ok": true}));
        let message = builder.create_response(json!({"text": "hi"}));
        let notice = builder.create_response(json!({"notice": "joined"}));

        builder
            .add_respondent_strategy(ack)
            .add_key_strategy(message, 42_i64)
            .add_broadcast_strategy(notice);

        let outbox = builder.into_outbox();
        let deliveries: Vec<_> = outbox.iter().map(|o| o.delivery.clone()).collect();
        assert_eq!(
            deliveries,
            vec![
                Delivery::Respondent,
                Delivery::ByKey(ConnectionKey::from("42")),
                Delivery::Broadcast
            ]
        );
    }

    #[test]
    fn test_empty_builder_sends_nothing() {
        let builder = ResponseBuilder::new(&Request::new("echo", "noop"));
        assert!(builder.is_empty());
        assert!(builder.into_outbox().is_empty());
    }
}
