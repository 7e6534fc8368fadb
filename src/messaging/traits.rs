//! Chat platform seam shared by the triage and chat pipelines.

use crate::error::Result;
use crate::{InboundMessage, OutboundResponse, StatusUpdate};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Normalized messages from the platform, in gateway order.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat platform Steward listens on and replies through.
pub trait Messaging: Send + Sync + 'static {
    /// Connect and hand back the inbound message stream.
    fn start(&self) -> impl Future<Output = Result<InboundStream>> + Send;

    /// Reply to `message` in its channel.
    fn respond(
        &self,
        message: &InboundMessage,
        response: OutboundResponse,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Show a transient status in the channel of `message`. Platforms without
    /// one ignore it.
    fn send_status(
        &self,
        _message: &InboundMessage,
        _status: StatusUpdate,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Disconnect.
    fn shutdown(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Object-safe mirror of [`Messaging`], so one adapter can sit behind an
/// `Arc<dyn MessagingDyn>` shared by both pipelines.
pub trait MessagingDyn: Send + Sync + 'static {
    fn start(&self) -> BoxFuture<'_, Result<InboundStream>>;

    fn respond<'a>(
        &'a self,
        message: &'a InboundMessage,
        response: OutboundResponse,
    ) -> BoxFuture<'a, Result<()>>;

    fn send_status<'a>(
        &'a self,
        message: &'a InboundMessage,
        status: StatusUpdate,
    ) -> BoxFuture<'a, Result<()>>;

    fn shutdown(&self) -> BoxFuture<'_, Result<()>>;
}

impl<T: Messaging> MessagingDyn for T {
    fn start(&self) -> BoxFuture<'_, Result<InboundStream>> {
        Box::pin(Messaging::start(self))
    }

    fn respond<'a>(
        &'a self,
        message: &'a InboundMessage,
        response: OutboundResponse,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Messaging::respond(self, message, response))
    }

    fn send_status<'a>(
        &'a self,
        message: &'a InboundMessage,
        status: StatusUpdate,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Messaging::send_status(self, message, status))
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(Messaging::shutdown(self))
    }
}
