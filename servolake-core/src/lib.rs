//! Request dispatch core for the ServoLake RPC middleware.
//!
//! The crate turns a request frame into a resolved method invocation on a servant and
//! turns its outcome back into a framed reply:
//!
//! - [`wire`]: binary stream with nested encapsulations, and the message header.
//! - [`request`]: the decoded request descriptor.
//! - [`servant`]: servant and locator traits, and the [`ServantDirectory`] resolving them.
//! - [`dispatch`]: the recyclable [`DispatchContext`] and the dispatch engine driving it.
//! - [`config`]: runtime and dispatch settings shared by the binary and the services.

mod error;
pub use error::{AnyError, AnyResult};

pub mod config;
pub mod dispatch;
pub mod fault;
pub mod identity;
pub mod request;
pub mod servant;
pub mod status;
pub mod wire;

pub use dispatch::{AsyncReply, ContextPool, DispatchContext, Invocation, MalformedRequest};
pub use fault::DispatchFault;
pub use identity::Identity;
pub use request::{OperationMode, RequestDescriptor};
pub use servant::{Dispatched, Located, Servant, ServantDirectory, ServantLocator};
pub use status::DispatchStatus;
pub use wire::{WireError, WireStream};
