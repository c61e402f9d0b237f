mod context;

pub use context::PeerAddr;
