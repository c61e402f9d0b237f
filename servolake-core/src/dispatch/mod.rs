//! Dispatch of one request: the recyclable [`DispatchContext`], the engine driving it
//! through decode, resolve and invoke, and the continuation used by deferred replies.
//!
//! A context moves through `Decoding -> Resolving -> Invoking` and ends either
//! `Completed`, with the framed reply in its output stream, or `Deferred`, owned by an
//! [`AsyncReply`] until the servant answers.

mod context;
mod engine;
mod pool;
mod reply;

pub use context::DispatchContext;
pub use engine::{Invocation, MalformedRequest};
pub use pool::ContextPool;
pub use reply::{AsyncReply, AsyncReplyError, ReplySink};
