use std::{convert::Infallible, sync::Arc};

use service_async::{MakeService, Service};
use servolake_core::{DispatchContext, Invocation, MalformedRequest, ServantDirectory};

/// Runs the dispatch engine for one bound context.
#[derive(Clone)]
pub struct DispatchService {
    directory: Arc<ServantDirectory>,
}

impl DispatchService {
    pub fn new(directory: Arc<ServantDirectory>) -> Self {
        DispatchService { directory }
    }

    pub fn factory(directory: Arc<ServantDirectory>) -> Self {
        Self::new(directory)
    }
}

impl Service<DispatchContext> for DispatchService {
    type Response = Invocation;
    type Error = MalformedRequest;

    async fn call(&self, ctx: DispatchContext) -> Result<Self::Response, Self::Error> {
        ctx.invoke(&self.directory)
    }
}

impl MakeService for DispatchService {
    type Service = Self;
    type Error = Infallible;

    fn make_via_ref(&self, _old: Option<&Self::Service>) -> Result<Self::Service, Self::Error> {
        Ok(self.clone())
    }
}
