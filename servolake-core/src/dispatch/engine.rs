use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, trace, warn};

use super::{context::LocatorBinding, DispatchContext};
use crate::{
    fault::{classify, Classified, DispatchFault, FaultBody, RequestFailed, RequestFailedKind},
    request::{write_facet_path, RequestDescriptor},
    servant::{Dispatched, Resolved, ServantDirectory},
    status::DispatchStatus,
    wire::{MessageHeader, WireError, REPLY_STATUS_POS},
};

/// How [`DispatchContext::invoke`] ended.
#[derive(Debug)]
pub enum Invocation {
    /// The reply, if one is owed, is framed in the context's output stream.
    Completed(DispatchContext),
    /// The context now belongs to the servant's [`AsyncReply`](super::AsyncReply).
    Deferred,
}

/// The request could not be decoded. The connection should be closed and the context
/// retired.
#[derive(Debug, thiserror::Error)]
#[error("malformed request: {error}")]
pub struct MalformedRequest {
    pub error: WireError,
    pub context: Box<DispatchContext>,
}

impl DispatchContext {
    /// Decode the bound request, resolve its servant, run it and encode the outcome.
    ///
    /// Recoverable faults become a reply status; only an undecodable request is returned
    /// as an error. The servant runs at most once.
    pub fn invoke(mut self, directory: &ServantDirectory) -> Result<Invocation, MalformedRequest> {
        let current = match self.decode() {
            Ok(current) => current,
            Err(error) => {
                debug!("dropping undecodable request: {error}");
                return Err(MalformedRequest {
                    error,
                    context: Box::new(self),
                });
            }
        };
        trace!("dispatching `{}` on `{}`", current.operation, current.id);

        if self.is_two_way() {
            self.os.write_byte(DispatchStatus::Ok.into());
            self.os.start_write_encaps();
        }

        // locators run user code too
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let Resolved { servant, locator } = directory.resolve(&current)?;
            if let Some((locator, cookie)) = locator {
                self.binding = Some(LocatorBinding {
                    locator,
                    servant: servant.clone(),
                    cookie,
                });
            }
            servant.dispatch(&current, &mut self)
        }))
        .unwrap_or_else(|payload| Err(DispatchFault::from_panic(payload)));

        if let Err(e) = self.is.end_read_encaps() {
            trace!("request encapsulation already closed: {e}");
        }
        self.current = Some(current);

        match outcome {
            Ok(Dispatched::Deferred) => match self.deferral.take() {
                Some(tx) => match tx.send(Some(self)) {
                    Ok(()) => Ok(Invocation::Deferred),
                    Err(Some(mut ctx)) => {
                        ctx.complete(Err(DispatchFault::unknown(
                            "async reply dropped before the dispatch returned",
                        )));
                        Ok(Invocation::Completed(ctx))
                    }
                    Err(None) => Ok(Invocation::Deferred),
                },
                None => {
                    self.complete(Err(DispatchFault::unknown(
                        "servant deferred its reply without arming it",
                    )));
                    Ok(Invocation::Completed(self))
                }
            },
            Ok(Dispatched::Completed(status)) => Ok(self.complete_now(Ok(status))),
            Err(fault) => Ok(self.complete_now(Err(fault))),
        }
    }

    fn complete_now(mut self, outcome: Result<DispatchStatus, DispatchFault>) -> Invocation {
        if let Some(tx) = self.deferral.take() {
            // the continuation learns the reply already went out
            let _ = tx.send(None);
        }
        self.complete(outcome);
        Invocation::Completed(self)
    }

    fn decode(&mut self) -> Result<RequestDescriptor, WireError> {
        let current = RequestDescriptor::read(&mut self.is)?;
        self.is.start_read_encaps()?;
        Ok(current)
    }

    /// Encode the outcome, seal the reply and release the locator.
    pub(super) fn complete(&mut self, outcome: Result<DispatchStatus, DispatchFault>) {
        let current = self.current.take().unwrap_or_default();
        let fault = match outcome {
            Ok(status @ (DispatchStatus::Ok | DispatchStatus::UserException)) => {
                if !self.is_two_way() {
                    None
                } else if !self.reply_prefix_intact() {
                    Some(DispatchFault::local("servant overwrote the reply header"))
                } else {
                    match self.os.end_write_encaps() {
                        Ok(()) => {
                            self.patch_status(status);
                            None
                        }
                        Err(e) => Some(DispatchFault::local(format!(
                            "cannot close reply encapsulation: {e}"
                        ))),
                    }
                }
            }
            Ok(status) => Some(fault_for_status(status)),
            Err(fault) => Some(fault),
        };

        if let Some(fault) = fault {
            let diag = fault.to_string();
            let Classified { status, body } = classify(fault, &current);
            self.log_fault(status, &diag, &current);
            if self.is_two_way() {
                // whatever the servant left in the stream is discarded, prefix included
                self.os.reset();
                self.write_reply_prefix();
                self.os.write_byte(status.into());
                match body {
                    FaultBody::Routing {
                        id,
                        facet,
                        operation,
                    } => {
                        id.write(&mut self.os);
                        write_facet_path(&mut self.os, &facet);
                        self.os.write_string(&operation);
                    }
                    FaultBody::Diagnostic(diag) => self.os.write_string(&diag),
                }
            }
        }

        if self.is_two_way() {
            MessageHeader::seal(&mut self.os);
        } else {
            self.os.reset();
        }
        self.current = Some(current);
        self.finish_locator();
    }

    fn patch_status(&mut self, status: DispatchStatus) {
        let end = self.os.pos();
        self.os.set_pos(REPLY_STATUS_POS);
        self.os.write_byte(status.into());
        self.os.set_pos(end);
    }

    fn log_fault(&self, status: DispatchStatus, diag: &str, current: &RequestDescriptor) {
        let threshold = if status.is_routing() { 1 } else { 0 };
        if self.warn_dispatch > threshold {
            warn!(
                "dispatch of `{}` on `{}` failed: {diag}",
                current.operation, current.id
            );
        } else {
            debug!(
                "dispatch of `{}` on `{}` failed: {diag}",
                current.operation, current.id
            );
        }
    }
}

/// A servant may report a failure status directly instead of returning a fault.
fn fault_for_status(status: DispatchStatus) -> DispatchFault {
    let kind = match status {
        DispatchStatus::ObjectNotExist => RequestFailedKind::ObjectNotExist,
        DispatchStatus::FacetNotExist => RequestFailedKind::FacetNotExist,
        DispatchStatus::OperationNotExist => RequestFailedKind::OperationNotExist,
        DispatchStatus::UnknownLocalException => return DispatchFault::local(status),
        DispatchStatus::UnknownUserException => return DispatchFault::user(status),
        DispatchStatus::Ok | DispatchStatus::UserException | DispatchStatus::UnknownException => {
            return DispatchFault::unknown(status)
        }
    };
    RequestFailed::new(kind).into()
}
