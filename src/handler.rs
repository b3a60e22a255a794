//! Handler trait and type erasure.
//!
//! The router holds handlers of different concrete types side by side, so
//! each one is hidden behind `dyn ErasedHandler`:
//!
//! ```text
//! async fn status(ctx: Ctx) -> Result<(), ApiError> { … }   ← user writes this
//!        ↓ endpoint.controller(status)
//! status.into_boxed_handler()                               ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(status))                               ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx)  at request time                        ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Ctx;
use crate::error::ApiError;

/// A heap-allocated, type-erased future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler resolves to. The response itself is sent through `Ctx`.
pub type HandlerResult = Result<(), ApiError>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Ctx) -> BoxFuture<'static, HandlerResult>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid endpoint handler.
///
/// Automatically satisfied by any function or closure of the shape
///
/// ```text
/// async fn name(ctx: Ctx) -> Result<(), ApiError>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut> private::Sealed for F
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
}

impl<F, Fut> Handler for F
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Ctx) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: Ctx) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.0)(ctx))
    }
}
