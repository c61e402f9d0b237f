use std::time::Duration;

use servolake_core::{
    servant::skeleton::dispatch_builtin, DispatchContext, DispatchFault, DispatchStatus,
    Dispatched, RequestDescriptor, Servant,
};
use tracing::{info, warn};

const TYPE_ID: &str = "::Demo::Hello";

/// `sayHello(delay: int)`. A positive delay answers from a helper thread after `delay`
/// milliseconds.
pub struct HelloServant;

impl Servant for HelloServant {
    fn dispatch(
        &self,
        current: &RequestDescriptor,
        ctx: &mut DispatchContext,
    ) -> Result<Dispatched, DispatchFault> {
        if current.operation != "sayHello" {
            return dispatch_builtin(TYPE_ID, &[], current, ctx);
        }
        let delay = ctx.istr().read_int()?;
        if delay <= 0 {
            info!("Hello World!");
            return Ok(Dispatched::Completed(DispatchStatus::Ok));
        }

        let reply = ctx.defer();
        std::thread::Builder::new()
            .name("servolake-hello".to_owned())
            .spawn(move || {
                std::thread::sleep(Duration::from_millis(delay as u64));
                info!("Hello World! (after {delay}ms)");
                if let Err(e) = futures::executor::block_on(reply.respond(|_| Ok(DispatchStatus::Ok)))
                {
                    warn!("delayed hello not delivered: {e}");
                }
            })
            .map_err(|e| DispatchFault::local(format!("cannot start hello thread: {e}")))?;
        Ok(Dispatched::Deferred)
    }
}
