use super::{WireError, WireStream};

pub const MAGIC: [u8; 4] = *b"IceP";
pub const PROTOCOL_MAJOR: u8 = 1;
pub const PROTOCOL_MINOR: u8 = 0;
pub const HEADER_SIZE: usize = 14;
/// The status byte follows the request id in a reply.
pub const REPLY_STATUS_POS: usize = HEADER_SIZE + 4;
/// Compression status 2 marks a compressed body.
pub const COMPRESSION_UNSUPPORTED: u8 = 2;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Offset of the `i32` message size inside the header.
pub const SIZE_OFFSET: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    BatchRequest = 1,
    Reply = 2,
    ValidateConnection = 3,
    CloseConnection = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => MessageType::Request,
            1 => MessageType::BatchRequest,
            2 => MessageType::Reply,
            3 => MessageType::ValidateConnection,
            4 => MessageType::CloseConnection,
            other => return Err(WireError::UnknownMessageType(other)),
        })
    }
}

/// Fixed header in front of every message.
///
/// Layout: magic, protocol major/minor, encoding major/minor, message type, compression
/// status, then the total message size (header included) as an `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub compression: u8,
    pub size: usize,
}

impl MessageHeader {
    pub fn new(message_type: MessageType) -> Self {
        MessageHeader {
            message_type,
            compression: 0,
            size: HEADER_SIZE,
        }
    }

    /// Decode and validate a header.
    pub fn read(raw: &[u8], max_message_size: usize) -> Result<Self, WireError> {
        if raw.len() < HEADER_SIZE {
            return Err(WireError::OutOfBounds {
                pos: 0,
                needed: HEADER_SIZE,
                len: raw.len(),
            });
        }
        let magic = [raw[0], raw[1], raw[2], raw[3]];
        if magic != MAGIC {
            return Err(WireError::BadMagic(magic));
        }
        if raw[4] != PROTOCOL_MAJOR || raw[5] > PROTOCOL_MINOR {
            return Err(WireError::UnsupportedProtocol {
                major: raw[4],
                minor: raw[5],
            });
        }
        if raw[6] != super::ENCODING_MAJOR || raw[7] > super::ENCODING_MINOR {
            return Err(WireError::UnsupportedEncoding {
                major: raw[6],
                minor: raw[7],
            });
        }
        let message_type = MessageType::try_from(raw[8])?;
        let compression = raw[9];
        if compression >= COMPRESSION_UNSUPPORTED {
            return Err(WireError::CompressionNotSupported);
        }
        let size = i32::from_le_bytes([raw[10], raw[11], raw[12], raw[13]]);
        if size < HEADER_SIZE as i32 || size as usize > max_message_size {
            return Err(WireError::IllegalMessageSize {
                size,
                max: max_message_size,
            });
        }
        Ok(MessageHeader {
            message_type,
            compression,
            size: size as usize,
        })
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&MAGIC);
        out[4] = PROTOCOL_MAJOR;
        out[5] = PROTOCOL_MINOR;
        out[6] = super::ENCODING_MAJOR;
        out[7] = super::ENCODING_MINOR;
        out[8] = self.message_type as u8;
        out[9] = self.compression;
        out[SIZE_OFFSET..].copy_from_slice(&(self.size as i32).to_le_bytes());
        out
    }

    /// Write at the stream cursor. The size is patched later by [`MessageHeader::seal`].
    pub fn write(&self, os: &mut WireStream) {
        os.write_blob(&self.encode());
    }

    /// Patch the size field of the message starting at offset 0 with the stream size.
    pub fn seal(os: &mut WireStream) {
        let end = os.pos();
        let size = os.size();
        os.set_pos(SIZE_OFFSET);
        os.write_int(size as i32);
        os.set_pos(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = MessageHeader::new(MessageType::Request);
        header.size = 40;
        let raw = header.encode();
        assert_eq!(&raw[..4], b"IceP");
        assert_eq!(MessageHeader::read(&raw, 1024).unwrap(), header);
    }

    #[test]
    fn test_header_validation() {
        let good = MessageHeader::new(MessageType::Reply).encode();

        let mut raw = good;
        raw[0] = b'X';
        assert!(matches!(
            MessageHeader::read(&raw, 1024),
            Err(WireError::BadMagic(_))
        ));

        let mut raw = good;
        raw[4] = 2;
        assert!(matches!(
            MessageHeader::read(&raw, 1024),
            Err(WireError::UnsupportedProtocol { major: 2, .. })
        ));

        let mut raw = good;
        raw[8] = 9;
        assert_eq!(
            MessageHeader::read(&raw, 1024),
            Err(WireError::UnknownMessageType(9))
        );

        let mut raw = good;
        raw[9] = COMPRESSION_UNSUPPORTED;
        assert_eq!(
            MessageHeader::read(&raw, 1024),
            Err(WireError::CompressionNotSupported)
        );

        let mut raw = good;
        raw[10..].copy_from_slice(&2048i32.to_le_bytes());
        assert!(matches!(
            MessageHeader::read(&raw, 1024),
            Err(WireError::IllegalMessageSize { size: 2048, .. })
        ));

        let mut raw = good;
        raw[10..].copy_from_slice(&3i32.to_le_bytes());
        assert!(MessageHeader::read(&raw, 1024).is_err());

        assert!(MessageHeader::read(&good[..10], 1024).is_err());
    }

    #[test]
    fn test_seal_patches_size() {
        let mut os = WireStream::new();
        MessageHeader::new(MessageType::Reply).write(&mut os);
        os.write_int(7);
        os.write_byte(0);
        MessageHeader::seal(&mut os);
        assert_eq!(os.pos(), REPLY_STATUS_POS + 1);
        let header = MessageHeader::read(os.as_bytes(), 1024).unwrap();
        assert_eq!(header.size, REPLY_STATUS_POS + 1);
    }
}
