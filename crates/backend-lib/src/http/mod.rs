// crates/backend-lib/src/http/mod.rs

//! Minimal HTTP layer: request/response context, router and dispatcher.
//!
//! The transport (axum) only delivers raw requests; matching routes and
//! running middleware happens here.

pub mod context;
pub mod pipeline;
pub mod router;

pub use context::{parse_cookies, RequestContext, ResponseContext};
pub use pipeline::Pipeline;
pub use router::{Route, RouteMatch, Router};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AppError;

/// Step that runs before a handler.
///
/// A middleware may mutate either context. Writing a response (see
/// [`ResponseContext::is_sent`]) or returning an error stops the chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError>;
}

/// Terminal step of a route
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, req: &mut RequestContext, res: &mut ResponseContext)
        -> Result<(), AppError>;
}

/// Adapter so a plain closure can serve as a [`Handler`] or [`Middleware`]
pub struct FnStep<F>(pub F);

#[async_trait]
impl<F> Handler for FnStep<F>
where
    F: Fn(&mut RequestContext, &mut ResponseContext) -> Result<(), AppError> + Send + Sync,
{
    async fn call(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        (self.0)(req, res)
    }
}

#[async_trait]
impl<F> Middleware for FnStep<F>
where
    F: Fn(&mut RequestContext, &mut ResponseContext) -> Result<(), AppError> + Send + Sync,
{
    async fn handle(
        &self,
        req: &mut RequestContext,
        res: &mut ResponseContext,
    ) -> Result<(), AppError> {
        (self.0)(req, res)
    }
}

/// Wrap a synchronous closure as a shared [`Handler`]
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(&mut RequestContext, &mut ResponseContext) -> Result<(), AppError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnStep(f))
}

/// Wrap a synchronous closure as a shared [`Middleware`]
pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&mut RequestContext, &mut ResponseContext) -> Result<(), AppError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnStep(f))
}
