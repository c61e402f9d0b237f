//! Preconstructed factories.

use std::{fmt::Debug, sync::Arc};

use monoio::net::TcpStream;
use service_async::{stack::FactoryStack, MakeService, Service};
use servolake_core::ServantDirectory;
use servolake_services::{
    common::PeerAddr,
    rpc::{DispatchService, RpcCoreService},
};

use crate::config::ServerConfig;

/// Create a new factory for an RPC listener dispatching into `directory`.
pub fn rpc_factory(
    config: ServerConfig,
    directory: Arc<ServantDirectory>,
) -> impl MakeService<
    Service = impl Service<(TcpStream, PeerAddr), Error = impl Debug>,
    Error = impl Debug,
> {
    FactoryStack::new(config)
        .replace(DispatchService::factory(directory))
        .push(RpcCoreService::layer())
        .into_inner()
}
