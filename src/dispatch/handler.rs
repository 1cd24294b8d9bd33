//! Event handler abstraction.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::message::ConnectionHandle;
use crate::state::ConnectionState;

/// Result returned by every handler.
pub type HandlerResult = anyhow::Result<Value>;

/// Boxed future borrowed from the handler arguments.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;

/// Handles one named event.
///
/// Handlers for the same connection are invoked one at a time, so the
/// state is borrowed mutably for the duration of the call.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(
        &self,
        conn: &ConnectionHandle,
        state: &mut ConnectionState,
        args: Vec<Value>,
    ) -> HandlerResult;
}

/// Handler backed by a synchronous closure.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&ConnectionHandle, &mut ConnectionState, Vec<Value>) -> HandlerResult + Send + Sync,
{
    async fn call(
        &self,
        conn: &ConnectionHandle,
        state: &mut ConnectionState,
        args: Vec<Value>,
    ) -> HandlerResult {
        (self.0)(conn, state, args)
    }
}

/// Build a handler from a synchronous closure.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&ConnectionHandle, &mut ConnectionState, Vec<Value>) -> HandlerResult + Send + Sync,
{
    FnHandler(f)
}

/// Handler backed by a closure returning a boxed future.
pub struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F> Handler for AsyncFnHandler<F>
where
    F: for<'a> Fn(&'a ConnectionHandle, &'a mut ConnectionState, Vec<Value>) -> HandlerFuture<'a>
        + Send
        + Sync,
{
    async fn call(
        &self,
        conn: &ConnectionHandle,
        state: &mut ConnectionState,
        args: Vec<Value>,
    ) -> HandlerResult {
        (self.0)(conn, state, args).await
    }
}

/// Build a handler from a closure returning `Box::pin(async move { .. })`.
pub fn async_handler<F>(f: F) -> AsyncFnHandler<F>
where
    F: for<'a> Fn(&'a ConnectionHandle, &'a mut ConnectionState, Vec<Value>) -> HandlerFuture<'a>
        + Send
        + Sync,
{
    AsyncFnHandler(f)
}
