use service_async::Param;
use servolake_core::config::DispatchConfig;
use servolake_services::rpc::RpcServerTimeout;

use super::ServerConfig;

impl Param<RpcServerTimeout> for ServerConfig {
    fn param(&self) -> RpcServerTimeout {
        self.server_timeout
    }
}

impl Param<DispatchConfig> for ServerConfig {
    fn param(&self) -> DispatchConfig {
        self.dispatch.clone()
    }
}
