use std::net::SocketAddr;

use derive_more::{Display, From, Into};

/// Address of the client on the other end of a connection.
#[derive(From, Into, Display, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);
