//! Inbound message handlers

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Receives every decoded inbound frame
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, payload: Value);
}

struct SyncHandler<F>(F);

#[async_trait]
impl<F> InboundHandler for SyncHandler<F>
where
    F: Fn(Value) + Send + Sync,
{
    async fn handle(&self, payload: Value) {
        (self.0)(payload)
    }
}

struct AsyncHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> InboundHandler for AsyncHandler<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, payload: Value) {
        (self.f)(payload).await
    }
}

/// Wrap a plain closure as an inbound handler
pub fn sync_handler<F>(f: F) -> Arc<dyn InboundHandler>
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(SyncHandler(f))
}

/// Wrap a closure returning a future as an inbound handler; the future is
/// awaited before the next handler runs
pub fn async_handler<F, Fut>(f: F) -> Arc<dyn InboundHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(AsyncHandler {
        f,
        _fut: PhantomData,
    })
}
