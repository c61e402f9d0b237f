use std::sync::Arc;

use futures_channel::oneshot;
use tracing::trace;

use super::{AsyncReply, ReplySink};
use crate::{
    request::RequestDescriptor,
    servant::{Cookie, Servant, ServantLocator},
    wire::{MessageHeader, MessageType, WireStream, HEADER_SIZE, REPLY_STATUS_POS, SIZE_OFFSET},
};

/// Locator that produced the servant of the in-flight dispatch.
pub(super) struct LocatorBinding {
    pub locator: Arc<dyn ServantLocator>,
    pub servant: Arc<dyn Servant>,
    pub cookie: Cookie,
}

/// Per-request state: the request bytes, the reply being built and the bookkeeping needed
/// to finish the dispatch.
///
/// Contexts are recycled. [`reset`](DispatchContext::reset) binds one to the next request
/// and keeps both stream buffers allocated.
pub struct DispatchContext {
    pub(super) is: WireStream,
    pub(super) os: WireStream,
    pub(super) request_id: Option<i32>,
    pub(super) current: Option<RequestDescriptor>,
    pub(super) binding: Option<LocatorBinding>,
    pub(super) deferral: Option<oneshot::Sender<Option<DispatchContext>>>,
    pub(super) reply_sink: Option<ReplySink>,
    pub(super) warn_dispatch: u32,
}

impl DispatchContext {
    pub fn new(warn_dispatch: u32) -> Self {
        DispatchContext {
            is: WireStream::new(),
            os: WireStream::new(),
            request_id: None,
            current: None,
            binding: None,
            deferral: None,
            reply_sink: None,
            warn_dispatch,
        }
    }

    /// Bind to a new request.
    ///
    /// `body` holds the request bytes following the request id. `request_id` is `None`
    /// for one-way requests; otherwise the reply header and id are written right away so
    /// the status byte lands at [`REPLY_STATUS_POS`](crate::wire::REPLY_STATUS_POS).
    pub fn reset(&mut self, body: &[u8], request_id: Option<i32>) {
        self.finish_locator();
        self.is.load(body);
        self.os.reset();
        self.current = None;
        self.deferral = None;
        self.request_id = request_id;
        self.write_reply_prefix();
    }

    /// Reply header and request id, written at the cursor of a two-way context.
    pub(super) fn write_reply_prefix(&mut self) {
        if let Some(id) = self.request_id {
            MessageHeader::new(MessageType::Reply).write(&mut self.os);
            self.os.write_int(id);
        }
    }

    /// Whether the header, request id and status placeholder written by `reset` are
    /// still in place. The size field is not checked, it is patched when sealing.
    pub(super) fn reply_prefix_intact(&self) -> bool {
        let Some(id) = self.request_id else {
            return true;
        };
        let out = self.os.as_bytes();
        let header = MessageHeader::new(MessageType::Reply).encode();
        out.len() > REPLY_STATUS_POS
            && out[..SIZE_OFFSET] == header[..SIZE_OFFSET]
            && out[HEADER_SIZE..REPLY_STATUS_POS] == id.to_le_bytes()
    }

    /// Release buffers and pending bookkeeping. A locator still waiting for `finished`
    /// gets it now.
    pub fn destroy(&mut self) {
        self.finish_locator();
        self.is.destroy();
        self.os.destroy();
        self.current = None;
        self.deferral = None;
        self.reply_sink = None;
        self.request_id = None;
    }

    #[inline]
    pub fn istr(&mut self) -> &mut WireStream {
        &mut self.is
    }

    #[inline]
    pub fn ostr(&mut self) -> &mut WireStream {
        &mut self.os
    }

    /// Framed reply, empty for one-way requests.
    #[inline]
    pub fn reply(&self) -> &[u8] {
        self.os.as_bytes()
    }

    #[inline]
    pub fn request_id(&self) -> Option<i32> {
        self.request_id
    }

    #[inline]
    pub fn is_two_way(&self) -> bool {
        self.request_id.is_some()
    }

    /// Descriptor of the request being dispatched, once decoded.
    #[inline]
    pub fn current(&self) -> Option<&RequestDescriptor> {
        self.current.as_ref()
    }

    /// Where deferred replies are delivered once complete.
    pub fn set_reply_sink(&mut self, sink: ReplySink) {
        self.reply_sink = Some(sink);
    }

    /// Arm a deferred reply. The servant must then return
    /// [`Dispatched::Deferred`](crate::servant::Dispatched::Deferred) and answer through
    /// the returned handle.
    pub fn defer(&mut self) -> AsyncReply {
        let (tx, rx) = oneshot::channel();
        self.deferral = Some(tx);
        AsyncReply::new(rx)
    }

    /// Call `finished` on the locator that produced the servant, if still pending.
    pub(super) fn finish_locator(&mut self) {
        if let Some(LocatorBinding {
            locator,
            servant,
            cookie,
        }) = self.binding.take()
        {
            let current = self.current.take().unwrap_or_default();
            trace!("locator finished for `{}` {}", current.id, current.operation);
            locator.finished(&current, &servant, cookie);
            self.current = Some(current);
        }
    }
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Drop for DispatchContext {
    fn drop(&mut self) {
        self.finish_locator();
    }
}

impl std::fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("request_id", &self.request_id)
            .field("current", &self.current)
            .field("in_size", &self.is.size())
            .field("out_size", &self.os.size())
            .field("locator_pending", &self.binding.is_some())
            .field("deferred", &self.deferral.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::REPLY_STATUS_POS;

    #[test]
    fn test_reset_two_way_writes_reply_prefix() {
        let mut ctx = DispatchContext::new(1);
        ctx.reset(&[1, 2, 3], Some(42));
        assert!(ctx.is_two_way());
        assert_eq!(ctx.ostr().size(), REPLY_STATUS_POS);
        assert_eq!(&ctx.reply()[14..18], &42i32.to_le_bytes());
        assert_eq!(ctx.istr().read_byte().unwrap(), 1);

        ctx.reset(&[9], None);
        assert!(!ctx.is_two_way());
        assert!(ctx.reply().is_empty());
        assert_eq!(ctx.istr().remaining(), 1);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut a = DispatchContext::new(1);
        a.ostr().write_string("leftover");
        a.reset(&[5, 6], Some(3));
        let first = a.reply().to_vec();
        a.reset(&[5, 6], Some(3));
        assert_eq!(a.reply(), &first[..]);
        assert_eq!(a.istr().pos(), 0);
        assert_eq!(a.istr().size(), 2);
        assert!(a.current().is_none());
    }

    #[test]
    fn test_destroy_twice() {
        let mut ctx = DispatchContext::new(1);
        ctx.reset(&[1], Some(1));
        ctx.destroy();
        ctx.destroy();
        assert!(ctx.reply().is_empty());
        assert_eq!(ctx.request_id(), None);
    }
}
