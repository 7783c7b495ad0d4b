//! Dispatch Error Types
//!
//! Every failure the dispatch pipeline can produce. Recoverable variants are
//! turned into error responses by the session; only an unrecoverable decode
//! error closes the connection.

use thiserror::Error;

/// Errors raised while registering, decoding, dispatching or delivering
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Frame is not a well-formed message
    #[error("Invalid message format: {message}")]
    Decode {
        message: String,
        /// Whether `route` and `event` could be recovered from the frame
        recoverable: bool,
    },

    /// No handler group exists for the route key
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    /// The route exists but has no handler for the event
    #[error("Unknown event '{event}' for route '{route}'")]
    UnknownEvent { route: String, event: String },

    /// Payload does not conform to the handler's schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// A handler requires a capability nobody provided
    #[error("Unresolved dependency: {0}")]
    UnresolvedDependency(&'static str),

    /// The handler itself failed
    #[error("{0}")]
    Handler(String),

    /// Writing to a specific connection failed
    #[error("Failed to deliver message to connection {0}")]
    Delivery(String),

    /// A (route, event) pair was registered twice
    #[error("Duplicate registration for route '{route}', event '{event}'")]
    DuplicateRegistration { route: String, event: String },

    /// The registry refused a new connection
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    /// The application rejected the connection parameters
    #[error("Handshake rejected: {0}")]
    Handshake(String),
}

impl DispatchError {
    /// Stable machine-readable code, used in logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "DECODE_ERROR",
            Self::UnknownRoute(_) => "UNKNOWN_ROUTE",
            Self::UnknownEvent { .. } => "UNKNOWN_EVENT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UnresolvedDependency(_) => "UNRESOLVED_DEPENDENCY",
            Self::Handler(_) => "HANDLER_FAILURE",
            Self::Delivery(_) => "DELIVERY_FAILURE",
            Self::DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
            Self::TooManyConnections(_) => "TOO_MANY_CONNECTIONS",
            Self::Handshake(_) => "HANDSHAKE_REJECTED",
        }
    }

    /// Whether the connection can keep serving after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Decode { recoverable, .. } => *recoverable,
            Self::TooManyConnections(_) | Self::Handshake(_) => false,
            _ => true,
        }
    }
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
