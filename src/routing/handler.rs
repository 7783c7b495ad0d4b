//! Event Handlers
//!
//! An [`EventHandler`] is the business logic bound to one event name within a
//! route. It declares:
//!
//! - `EVENT`: the event name it answers to
//! - `Data`: the payload schema; use [`serde_json::Value`] to receive the raw
//!   payload without validation
//! - `Deps`: the capabilities it needs from the connection's
//!   [`Dependencies`], resolved before `handle` runs
//!
//! ```rust,ignore
//! struct UserEvent;
//!
//! #[async_trait]
//! impl EventHandler for UserEvent {
//!     const EVENT: &'static str = "user";
//!     type Data = UserSchema;
//!     type Deps = Dep<User>;
//!
//!     async fn handle(
//!         &self,
//!         data: UserSchema,
//!         user: Dep<User>,
//!         responses: &mut ResponseBuilder,
//!     ) -> anyhow::Result<()> {
//!         responses.reply(json!({"user": user.id, "user_id_from_request": data.user_id}));
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::type_name;
use std::panic::AssertUnwindSafe;

use super::response::ResponseBuilder;
use crate::error::{DispatchError, DispatchResult};
use crate::injector::{Dependencies, Resolve};

/// Business logic for one (route, event) pair
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Event name, unique within its route
    const EVENT: &'static str;

    /// Payload schema
    type Data: DeserializeOwned + Send + 'static;

    /// Injected capabilities
    type Deps: Resolve + Send + 'static;

    /// Process one validated request.
    ///
    /// Attach responses to `responses`; attaching none sends nothing. An error
    /// is reported to the requesting connection only, and anything already
    /// attached is discarded.
    async fn handle(
        &self,
        data: Self::Data,
        deps: Self::Deps,
        responses: &mut ResponseBuilder,
    ) -> anyhow::Result<()>;
}

/// Type-erased handler stored in the route table
#[async_trait]
pub trait DynHandler: Send + Sync {
    /// Event name the handler answers to
    fn event(&self) -> &'static str;

    /// Name of the payload schema type
    fn schema(&self) -> &'static str;

    /// Validate, resolve dependencies and run the handler
    async fn call(
        &self,
        data: Option<Value>,
        deps: &Dependencies,
        responses: &mut ResponseBuilder,
    ) -> DispatchResult<()>;
}

/// Adapts an [`EventHandler`] to [`DynHandler`]
pub(crate) struct Erased<H>(pub(crate) H);

#[async_trait]
impl<H: EventHandler> DynHandler for Erased<H> {
    fn event(&self) -> &'static str {
        H::EVENT
    }

    fn schema(&self) -> &'static str {
        type_name::<H::Data>()
    }

    async fn call(
        &self,
        data: Option<Value>,
        deps: &Dependencies,
        responses: &mut ResponseBuilder,
    ) -> DispatchResult<()> {
        let data: H::Data = serde_json::from_value(data.unwrap_or(Value::Null))
            .map_err(|e| DispatchError::Validation(e.to_string()))?;

        let deps = H::Deps::resolve(deps)?;

        match AssertUnwindSafe(self.0.handle(data, deps, responses))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DispatchError::Handler(format!("{:#}", e))),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(DispatchError::Handler(format!("Handler panicked: {}", message)))
            }
        }
    }
}
