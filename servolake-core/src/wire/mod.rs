//! Binary wire format.
//!
//! Everything is little-endian. Variable-width sizes take one byte below 255, otherwise a
//! `255` marker followed by an `i32`. Argument and result payloads travel inside
//! encapsulations: `[size: i32][major: u8][minor: u8][payload]`, where `size` counts the
//! 6-byte encapsulation header.
//!
//! - [`WireStream`]: cursor-based reader/writer over a reusable buffer.
//! - [`MessageHeader`]: the fixed 14-byte header in front of every message.

mod protocol;
mod stream;

pub use protocol::{
    MessageHeader, MessageType, COMPRESSION_UNSUPPORTED, DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE,
    MAGIC, PROTOCOL_MAJOR, PROTOCOL_MINOR, REPLY_STATUS_POS, SIZE_OFFSET,
};
pub use stream::{WireStream, ENCAPS_HEADER_SIZE, ENCODING_MAJOR, ENCODING_MINOR};

/// Decode faults raised while reading a stream or a message header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unmarshal out of bounds: need {needed} bytes at {pos}, have {len}")]
    OutOfBounds { pos: usize, needed: usize, len: usize },
    #[error("negative size {0}")]
    NegativeSize(i32),
    #[error("invalid utf-8 string: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("illegal encapsulation size {size} at {pos}")]
    EncapsulationSize { pos: usize, size: i32 },
    #[error("unsupported encoding {major}.{minor}")]
    UnsupportedEncoding { major: u8, minor: u8 },
    #[error("cursor {end} moved in front of the encapsulation opened at {start}")]
    EncapsulationUnderflow { start: usize, end: usize },
    #[error("no encapsulation is open")]
    NoEncapsulation,
    #[error("facet path with {0} elements, at most one is allowed")]
    MalformedFacetPath(usize),
    #[error("invalid operation mode {0}")]
    InvalidOperationMode(u8),
    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),
    #[error("unsupported protocol {major}.{minor}")]
    UnsupportedProtocol { major: u8, minor: u8 },
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("compressed messages are not supported")]
    CompressionNotSupported,
    #[error("illegal message size {size} (max {max})")]
    IllegalMessageSize { size: i32, max: usize },
}
