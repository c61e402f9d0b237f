use std::{collections::HashMap, net::SocketAddr, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use servolake_core::config::{parse, ConfigFormat, DispatchConfig, RuntimeConfig};
use servolake_services::rpc::RpcServerTimeout;

mod extractor;

const DEFAULT_SERVER_NAME: &str = "demo";
const DEFAULT_PORT: u16 = 10000;

#[derive(Debug, Clone)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub servers: HashMap<String, ServerConfig>,
}

/// Everything one listener needs; shared by all workers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub listener: ListenerConfig,
    pub server_timeout: RpcServerTimeout,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenerConfig {
    pub socket_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerUserConfig {
    pub listener: ListenerConfig,
    #[serde(default)]
    pub timeout: RpcTimeout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RpcTimeout {
    // Connection keepalive timeout: close the connection if no message starts in time.
    keepalive_timeout_sec: Option<u64>,
    // Read the rest of a message after its header.
    message_timeout_sec: Option<u64>,
}

impl From<RpcTimeout> for RpcServerTimeout {
    fn from(t: RpcTimeout) -> Self {
        RpcServerTimeout {
            keepalive_timeout: t.keepalive_timeout_sec.map(Duration::from_secs),
            message_timeout: t.message_timeout_sec.map(Duration::from_secs),
        }
    }
}

#[derive(Deserialize)]
struct UserConfig {
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    dispatch: DispatchConfig,
    servers: HashMap<String, ServerUserConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Config: error reading {}: {e}", path.display()))?;
        Self::from_slice(Some(path), &content)
    }

    pub fn from_slice(path: Option<&Path>, content: &[u8]) -> anyhow::Result<Self> {
        let format = ConfigFormat::detect(path, content);
        let UserConfig {
            runtime,
            dispatch,
            servers,
        } = parse::<UserConfig>(format, content)?;
        if servers.is_empty() {
            anyhow::bail!("Config: no server configured");
        }
        let servers = servers
            .into_iter()
            .map(|(name, server)| {
                let config = ServerConfig {
                    name: name.clone(),
                    listener: server.listener,
                    server_timeout: server.timeout.into(),
                    dispatch: dispatch.clone(),
                };
                (name, config)
            })
            .collect();
        Ok(Config { runtime, servers })
    }
}

impl Default for Config {
    /// A single server on the well-known demo port.
    fn default() -> Self {
        let server = ServerConfig {
            name: DEFAULT_SERVER_NAME.to_owned(),
            listener: ListenerConfig {
                socket_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            },
            server_timeout: RpcServerTimeout::default(),
            dispatch: DispatchConfig::default(),
        };
        Config {
            runtime: RuntimeConfig::default(),
            servers: HashMap::from([(DEFAULT_SERVER_NAME.to_owned(), server)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_deserialize() {
        const TEST_CONFIG: &str = "
            [runtime]
            worker_threads = 2
            runtime_type = 'legacy'

            [dispatch]
            warn_dispatch = 2

            [servers.hello]
            listener = { socket_addr = '127.0.0.1:10000' }
            timeout = { keepalive_timeout_sec = 75, message_timeout_sec = 5 }
        ";

        let config = Config::from_slice(None, TEST_CONFIG.as_bytes()).unwrap();
        assert_eq!(config.runtime.worker_threads, 2);
        let server = &config.servers["hello"];
        assert_eq!(server.name, "hello");
        assert_eq!(server.dispatch.warn_dispatch, 2);
        assert_eq!(server.dispatch.pool_capacity, 8);
        assert_eq!(
            server.server_timeout.keepalive_timeout,
            Some(Duration::from_secs(75))
        );
        assert_eq!(
            server.server_timeout.message_timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_json_deserialize() {
        const TEST_CONFIG: &str = r#"
            {
                "servers": {
                    "hello": { "listener": { "socket_addr": "[::]:10000" } }
                }
            }
        "#;

        let config = Config::from_slice(Some(Path::new("servolake.conf")), TEST_CONFIG.as_bytes())
            .unwrap();
        let server = &config.servers["hello"];
        assert_eq!(server.listener.socket_addr.port(), 10000);
        assert_eq!(server.server_timeout, RpcServerTimeout::default());
        assert_eq!(server.dispatch, DispatchConfig::default());
    }

    #[test]
    fn test_rejects_empty_servers() {
        assert!(Config::from_slice(None, b"[servers]").is_err());
        assert!(Config::from_slice(None, b"[runtime]").is_err());
    }

    #[test]
    fn test_default_server() {
        let config = Config::default();
        assert_eq!(
            config.servers["demo"].listener.socket_addr,
            "0.0.0.0:10000".parse::<SocketAddr>().unwrap()
        );
    }
}
