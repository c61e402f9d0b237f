//! Services connecting sockets to the ServoLake dispatch core.
//!
//! - [`rpc`]: the per-connection protocol loop and the dispatch service it drives.
//! - [`common`]: types shared between services.

pub mod common;
pub mod rpc;

pub use servolake_core::{AnyError, AnyResult};
