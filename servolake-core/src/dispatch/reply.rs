use std::panic::{self, AssertUnwindSafe};

use futures_channel::{mpsc, oneshot};
use tracing::debug;

use super::DispatchContext;
use crate::{fault::DispatchFault, status::DispatchStatus, wire::WireStream};

/// Channel completed contexts are pushed into for writing.
pub type ReplySink = mpsc::UnboundedSender<DispatchContext>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AsyncReplyError {
    /// The servant returned a status instead of deferring; that reply already went out.
    #[error("the dispatch completed synchronously")]
    Completed,
    /// The context was destroyed before the servant returned.
    #[error("the dispatch was abandoned")]
    Abandoned,
    /// The connection is gone; the reply was dropped.
    #[error("the reply sink is closed")]
    SinkClosed,
}

/// Continuation for a deferred dispatch, obtained from [`DispatchContext::defer`].
///
/// The handle is `Send` and may be completed from any thread.
#[derive(Debug)]
pub struct AsyncReply {
    rx: oneshot::Receiver<Option<DispatchContext>>,
}

impl AsyncReply {
    pub(super) fn new(rx: oneshot::Receiver<Option<DispatchContext>>) -> Self {
        AsyncReply { rx }
    }

    /// Finish the dispatch.
    ///
    /// `f` writes the results into the open reply encapsulation and returns the status,
    /// or a fault which is encoded like a synchronous one. The sealed context is pushed
    /// into the connection's reply sink, or destroyed if the sink is closed.
    pub async fn respond<F>(self, f: F) -> Result<(), AsyncReplyError>
    where
        F: FnOnce(&mut WireStream) -> Result<DispatchStatus, DispatchFault>,
    {
        let mut ctx = self
            .rx
            .await
            .map_err(|_| AsyncReplyError::Abandoned)?
            .ok_or(AsyncReplyError::Completed)?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut ctx.os)))
            .unwrap_or_else(|payload| Err(DispatchFault::from_panic(payload)));
        ctx.complete(outcome);

        match ctx.reply_sink.clone() {
            Some(sink) => sink.unbounded_send(ctx).map_err(|e| {
                debug!("dropping deferred reply: {e}");
                e.into_inner().destroy();
                AsyncReplyError::SinkClosed
            }),
            None => {
                ctx.destroy();
                Err(AsyncReplyError::SinkClosed)
            }
        }
    }
}
