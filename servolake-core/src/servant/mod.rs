//! Servants, servant locators and the directory resolving requests to them.
use std::{any::Any, sync::Arc};

use crate::{
    dispatch::DispatchContext, fault::DispatchFault, request::RequestDescriptor,
    status::DispatchStatus,
};

mod directory;
pub mod skeleton;

pub use directory::{DirectoryError, Resolved, ServantDirectory};

/// Result of a servant dispatch that did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The reply outcome is known and the results, if any, are in the output stream.
    Completed(DispatchStatus),
    /// The servant armed [`DispatchContext::defer`] and will answer through the
    /// returned [`AsyncReply`](crate::dispatch::AsyncReply).
    Deferred,
}

/// An application object able to execute operations.
///
/// Arguments are read from `ctx.istr()` inside the already opened request encapsulation;
/// results and declared exceptions go to `ctx.ostr()`.
pub trait Servant: Send + Sync + 'static {
    fn dispatch(
        &self,
        current: &RequestDescriptor,
        ctx: &mut DispatchContext,
    ) -> Result<Dispatched, DispatchFault>;
}

/// Opaque value a locator hands out with a servant and gets back in `finished`.
pub type Cookie = Option<Box<dyn Any + Send>>;

/// A servant produced by a locator.
pub struct Located {
    pub servant: Arc<dyn Servant>,
    pub cookie: Cookie,
}

impl Located {
    pub fn new(servant: Arc<dyn Servant>) -> Self {
        Located {
            servant,
            cookie: None,
        }
    }

    pub fn with_cookie<T: Any + Send>(servant: Arc<dyn Servant>, cookie: T) -> Self {
        Located {
            servant,
            cookie: Some(Box::new(cookie)),
        }
    }
}

impl std::fmt::Debug for Located {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Located")
            .field("cookie", &self.cookie.is_some())
            .finish()
    }
}

/// Produces servants on demand for a category of identities.
///
/// `finished` is called exactly once for every `locate` that returned a servant, after the
/// reply has been encoded or the dispatch has been abandoned.
pub trait ServantLocator: Send + Sync + 'static {
    fn locate(&self, current: &RequestDescriptor) -> Result<Option<Located>, DispatchFault>;

    fn finished(&self, current: &RequestDescriptor, servant: &Arc<dyn Servant>, cookie: Cookie);

    /// Called once when the locator is removed from its directory.
    fn deactivate(&self, _category: &str) {}
}
