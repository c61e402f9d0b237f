use std::{cell::RefCell, convert::Infallible, rc::Rc, time::Duration};

use futures_channel::mpsc;
use futures_util::StreamExt;
use monoio::io::{
    sink::{Sink, SinkExt},
    stream::Stream,
    AsyncReadRent, AsyncWriteRent, Split, Splitable,
};
use monoio_codec::{FramedRead, FramedWrite};
use service_async::{
    layer::{layer_fn, FactoryLayer},
    AsyncMakeService, MakeService, Param, Service,
};
use servolake_core::{
    config::DispatchConfig,
    wire::{MessageHeader, MessageType},
    ContextPool, DispatchContext, Invocation, MalformedRequest,
};
use tracing::{debug, error, info, trace, warn};

use super::codec::{Message, MessageCodec};
use crate::common::PeerAddr;

/// Per-connection protocol loop.
///
/// Reads one message at a time; request bodies are bound to pooled dispatch contexts and
/// passed to the inner dispatch service. Completed two-way contexts, including deferred
/// ones finishing later, travel through a reply channel to a writer task that owns the
/// write half of the connection.
#[derive(Clone)]
pub struct RpcCoreService<H> {
    handler: H,
    timeout: RpcServerTimeout,
    dispatch: DispatchConfig,
}

impl<H> RpcCoreService<H> {
    pub fn new(handler: H, timeout: RpcServerTimeout, dispatch: DispatchConfig) -> Self {
        RpcCoreService {
            handler,
            timeout,
            dispatch,
        }
    }
}

async fn write_replies<W: AsyncWriteRent>(
    mut encoder: FramedWrite<W, MessageCodec>,
    mut replies: mpsc::UnboundedReceiver<DispatchContext>,
    pool: Rc<RefCell<ContextPool>>,
    peer: PeerAddr,
) {
    while let Some(ctx) = replies.next().await {
        if ctx.is_two_way() {
            if let Err(e) = encoder.send_and_flush(&ctx).await {
                warn!("error when writing reply to {peer}: {e}");
                pool.borrow_mut().retire(ctx);
                break;
            }
            trace!("sent reply to request {:?}", ctx.request_id());
        }
        pool.borrow_mut().release(ctx);
    }

    // replies queued behind a failed write are never sent
    replies.close();
    while let Ok(Some(ctx)) = replies.try_next() {
        pool.borrow_mut().retire(ctx);
    }
    if let Err(e) = Sink::<&DispatchContext>::close(&mut encoder).await {
        debug!("error when closing connection {peer}: {e}");
    }
}

impl<H, S> Service<(S, PeerAddr)> for RpcCoreService<H>
where
    H: Service<DispatchContext, Response = Invocation, Error = MalformedRequest>,
    S: Split + AsyncReadRent + AsyncWriteRent + 'static,
{
    type Response = ();
    type Error = Infallible;

    async fn call(&self, (stream, peer): (S, PeerAddr)) -> Result<Self::Response, Self::Error> {
        let codec = MessageCodec::new(self.dispatch.max_message_size);
        let (reader, writer) = stream.into_split();
        let mut decoder = FramedRead::new(reader, codec);
        let mut encoder = FramedWrite::new(writer, codec);

        let validate = MessageHeader::new(MessageType::ValidateConnection);
        if let Err(e) = encoder.send_and_flush(validate).await {
            warn!("error when validating connection {peer}: {e}");
            return Ok(());
        }

        let (sink, replies) = mpsc::unbounded();
        let pool = Rc::new(RefCell::new(
            ContextPool::new(&self.dispatch).with_reply_sink(sink.clone()),
        ));
        let writer_task = monoio::spawn(write_replies(encoder, replies, pool.clone(), peer));

        loop {
            if let Some(keepalive_timeout) = self.timeout.keepalive_timeout {
                match monoio::time::timeout(keepalive_timeout, decoder.peek_data()).await {
                    Ok(Ok([])) => {
                        trace!("connection {peer} closed normally due to read EOF");
                        break;
                    }
                    Ok(Err(e)) => {
                        error!("connection {peer} io error: {e}");
                        break;
                    }
                    Err(_) => {
                        info!("connection {peer} keepalive timed out");
                        break;
                    }
                    _ => {}
                }
            }

            let decoded = match self.timeout.message_timeout {
                Some(message_timeout) => {
                    match monoio::time::timeout(message_timeout, decoder.next()).await {
                        Ok(x) => x,
                        Err(_) => {
                            info!("connection {peer} message timed out");
                            break;
                        }
                    }
                }
                None => decoder.next().await,
            };

            let Message { header, body } = match decoded {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!("bad message from {peer}: {e}");
                    break;
                }
                None => {
                    trace!("connection {peer} closed normally due to read EOF");
                    break;
                }
            };

            match header.message_type {
                MessageType::Request => {}
                MessageType::CloseConnection => {
                    debug!("connection {peer} closed by peer");
                    break;
                }
                other => {
                    warn!("unexpected {other:?} message from {peer}");
                    break;
                }
            }

            let Some((id, body)) = body.split_first_chunk::<4>() else {
                warn!("request from {peer} is too short to carry a request id");
                break;
            };
            let request_id = i32::from_le_bytes(*id);

            let mut ctx = pool.borrow_mut().acquire();
            ctx.reset(body, (request_id != 0).then_some(request_id));
            match self.handler.call(ctx).await {
                Ok(Invocation::Completed(ctx)) if ctx.is_two_way() => {
                    if let Err(e) = sink.unbounded_send(ctx) {
                        pool.borrow_mut().retire(e.into_inner());
                        break;
                    }
                }
                Ok(Invocation::Completed(ctx)) => pool.borrow_mut().release(ctx),
                Ok(Invocation::Deferred) => trace!("request {request_id} from {peer} deferred"),
                Err(MalformedRequest { error, context }) => {
                    warn!("malformed request from {peer}: {error}");
                    pool.borrow_mut().retire(*context);
                    break;
                }
            }
        }

        // late deferred replies find the channel closed and destroy their contexts
        sink.close_channel();
        drop(sink);
        writer_task.await;
        pool.borrow_mut().destroy();
        Ok(())
    }
}

// RpcCoreService is a Service and a MakeService.
impl<F> MakeService for RpcCoreService<F>
where
    F: MakeService,
{
    type Service = RpcCoreService<F::Service>;
    type Error = F::Error;

    fn make_via_ref(&self, old: Option<&Self::Service>) -> Result<Self::Service, Self::Error> {
        Ok(RpcCoreService {
            handler: self.handler.make_via_ref(old.map(|o| &o.handler))?,
            timeout: self.timeout,
            dispatch: self.dispatch.clone(),
        })
    }
}

impl<F: AsyncMakeService> AsyncMakeService for RpcCoreService<F> {
    type Service = RpcCoreService<F::Service>;
    type Error = F::Error;

    async fn make_via_ref(
        &self,
        old: Option<&Self::Service>,
    ) -> Result<Self::Service, Self::Error> {
        Ok(RpcCoreService {
            handler: self
                .handler
                .make_via_ref(old.map(|o| &o.handler))
                .await?,
            timeout: self.timeout,
            dispatch: self.dispatch.clone(),
        })
    }
}

/// Connection timeouts.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RpcServerTimeout {
    // Close the connection if no message starts within this time.
    pub keepalive_timeout: Option<Duration>,
    // Read the rest of a message once its header arrived.
    pub message_timeout: Option<Duration>,
}

impl<F> RpcCoreService<F> {
    pub fn layer<C>() -> impl FactoryLayer<C, F, Factory = Self>
    where
        C: Param<RpcServerTimeout> + Param<DispatchConfig>,
    {
        layer_fn(|c: &C, inner| {
            Self::new(
                inner,
                Param::<RpcServerTimeout>::param(c),
                Param::<DispatchConfig>::param(c),
            )
        })
    }
}
