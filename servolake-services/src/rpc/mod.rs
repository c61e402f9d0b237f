//! Server side of the RPC protocol.
//!
//! [`RpcCoreService`] owns an accepted connection: it validates the connection, reads
//! framed messages, hands request bodies to its inner dispatch service through pooled
//! [`DispatchContext`](servolake_core::DispatchContext)s and writes replies back from a
//! dedicated writer task.
//!
//! The inner service is usually a [`DispatchService`], which runs the dispatch engine
//! against a shared [`ServantDirectory`](servolake_core::ServantDirectory):
//!
//! ```ignore
//! use service_async::stack::FactoryStack;
//!
//! let stack = FactoryStack::new(server_config)
//!     .replace(DispatchService::factory(directory))
//!     .push(RpcCoreService::layer());
//! let service = stack.make()?;
//! ```
//!
//! Replies are written in completion order; a deferred reply may overtake replies to
//! later requests.
mod codec;
mod core;
mod dispatcher;

pub use self::{
    codec::{Message, MessageCodec},
    core::{RpcCoreService, RpcServerTimeout},
    dispatcher::DispatchService,
};
