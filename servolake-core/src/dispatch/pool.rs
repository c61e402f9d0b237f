use tracing::trace;

use super::{DispatchContext, ReplySink};
use crate::config::DispatchConfig;

/// Per-connection free list of dispatch contexts.
///
/// Contexts are created lazily and at most `capacity` idle ones are kept.
#[derive(Debug)]
pub struct ContextPool {
    free: Vec<DispatchContext>,
    capacity: usize,
    warn_dispatch: u32,
    reply_sink: Option<ReplySink>,
}

impl ContextPool {
    pub fn new(config: &DispatchConfig) -> Self {
        ContextPool {
            free: Vec::with_capacity(config.pool_capacity),
            capacity: config.pool_capacity,
            warn_dispatch: config.warn_dispatch,
            reply_sink: None,
        }
    }

    /// Attach the connection's reply sink to every context handed out.
    pub fn with_reply_sink(mut self, sink: ReplySink) -> Self {
        self.reply_sink = Some(sink);
        self
    }

    pub fn acquire(&mut self) -> DispatchContext {
        let mut ctx = self.free.pop().unwrap_or_else(|| {
            trace!("allocating dispatch context");
            DispatchContext::new(self.warn_dispatch)
        });
        if let Some(sink) = &self.reply_sink {
            ctx.set_reply_sink(sink.clone());
        }
        ctx
    }

    /// Take a context back once its reply is written.
    pub fn release(&mut self, mut ctx: DispatchContext) {
        if self.free.len() < self.capacity {
            ctx.reset(&[], None);
            self.free.push(ctx);
        } else {
            ctx.destroy();
        }
    }

    /// Drop a context that must not be reused.
    pub fn retire(&mut self, mut ctx: DispatchContext) {
        ctx.destroy();
    }

    pub fn destroy(&mut self) {
        for mut ctx in self.free.drain(..) {
            ctx.destroy();
        }
        self.reply_sink = None;
    }

    #[inline]
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize) -> DispatchConfig {
        DispatchConfig {
            pool_capacity: capacity,
            ..Default::default()
        }
    }

    #[test]
    fn test_release_respects_capacity() {
        let mut pool = ContextPool::new(&config(1));
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 1);

        let c = pool.acquire();
        assert_eq!(pool.idle(), 0);
        pool.retire(c);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_released_context_is_clean() {
        let mut pool = ContextPool::new(&config(4));
        let mut ctx = pool.acquire();
        ctx.reset(&[1, 2, 3], Some(5));
        pool.release(ctx);

        let mut ctx = pool.acquire();
        assert_eq!(ctx.request_id(), None);
        assert!(ctx.reply().is_empty());
        assert_eq!(ctx.istr().size(), 0);
        pool.release(ctx);

        pool.destroy();
        assert_eq!(pool.idle(), 0);
    }
}
