//! Route handlers.

use std::future::Future;

use async_trait::async_trait;

use crate::dispatch::{BoxError, Reply, RequestContext};

/// The final step of a route: consumes the accumulated context and replies.
///
/// Implemented for any `Fn(RequestContext) -> impl Future<Output = Result<Reply, BoxError>>`.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: RequestContext) -> Result<Reply, BoxError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, BoxError>> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext) -> Result<Reply, BoxError> {
        (self)(ctx).await
    }
}
