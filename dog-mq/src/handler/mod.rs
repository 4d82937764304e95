pub mod registry;

pub use registry::HandlerRegistry;

use async_trait::async_trait;
use std::future::Future;

use crate::{HandlerError, types::{HandlerCtx, Message}};

/// Consumer-side callback for a topic
///
/// Called concurrently from worker tasks; each call receives its own copy of
/// the message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: HandlerCtx, message: Message) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(HandlerCtx, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: HandlerCtx, message: Message) -> Result<(), HandlerError> {
        (self)(ctx, message).await
    }
}
